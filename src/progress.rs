//! Progress tracking for counting runs.
//!
//! A single [`ProgressTracker`] is shared by every worker. Each fetched read
//! bumps one atomic counter; the worker whose read lands on a reporting
//! boundary takes a [`Progress`] snapshot and reports it. Reports are
//! advisory and never influence counting.
//!
//! # Example
//!
//! ```rust
//! use ixcount::progress::ProgressTracker;
//!
//! let tracker = ProgressTracker::new();
//! tracker.record_read();
//! assert_eq!(tracker.snapshot().reads_processed, 1);
//! ```

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Progress snapshot during counting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Number of reads fetched so far, across all workers.
    pub reads_processed: u64,
    /// Time since the tracker was created.
    pub elapsed: Duration,
    /// Whole-second throughput; zero until a full second has passed.
    pub reads_per_sec: u64,
}

/// Thread-safe read counter with a start time.
#[derive(Debug)]
pub struct ProgressTracker {
    reads: AtomicU64,
    start: Instant,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create a new progress tracker starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reads: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// Record that one read has been fetched and return the new total.
    ///
    /// This method is thread-safe and can be called from multiple threads.
    pub fn record_read(&self) -> u64 {
        self.reads.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get a snapshot of the current progress.
    pub fn snapshot(&self) -> Progress {
        self.progress_at(self.reads.load(Ordering::Relaxed))
    }

    /// Snapshot for a specific read total, as returned by [`record_read`](Self::record_read).
    pub fn progress_at(&self, reads_processed: u64) -> Progress {
        let elapsed = self.start.elapsed();
        let secs = elapsed.as_secs();
        Progress {
            reads_processed,
            elapsed,
            reads_per_sec: if secs > 0 { reads_processed / secs } else { 0 },
        }
    }
}

/// Whether read number `reads` (1-based) crosses a reporting boundary.
///
/// An interval of zero disables reporting.
#[inline]
pub const fn is_report_point(reads: u64, interval: u64) -> bool {
    interval > 0 && reads % interval == 0
}
