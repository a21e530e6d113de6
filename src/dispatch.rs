//! The worker pool that turns reads into counts.
//!
//! The [`Dispatcher`] starts a fixed number of worker threads. Each worker
//! loops independently:
//!
//! ```text
//! Idle -> Fetching -> Tokenizing -> Counting -> Fetching -> ... -> Done
//! ```
//!
//! fetching a read from the shared [`ReadStream`], stripping terminator
//! artifacts, and calling [`CountTable::increment`] for every k-mer window.
//! The dispatcher blocks until every worker has seen the end of the stream
//! and only then returns, so a caller can never dump a partial table.
//!
//! Windows containing a byte outside `{A,C,G,T}` are skipped (the worker jumps
//! past the offending base) and windows whose canonical k-mer is not in the
//! index are dropped. Both are tallied per worker and reported in the
//! returned [`CountSummary`]; neither touches the shared counters.

use std::borrow::Cow;

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::{
    counts::{CountTable, Increment},
    error::CountError,
    index::KmerIndex,
    progress::{is_report_point, Progress, ProgressTracker},
    reader::ReadStream,
};

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 12;

/// Default number of reads between progress reports.
pub const DEFAULT_REPORT_INTERVAL: u64 = 250_000;

/// Per-run totals, merged from every worker's private tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountSummary {
    /// Number of workers that ran.
    pub workers: usize,
    /// Reads fetched from the stream.
    pub reads: u64,
    /// K-mer windows examined.
    pub windows: u64,
    /// Windows whose canonical k-mer was counted.
    pub counted: u64,
    /// Windows whose canonical k-mer is not in the index.
    pub missed: u64,
    /// Windows skipped because they contain an invalid base.
    pub invalid: u64,
}

impl CountSummary {
    fn merge(&mut self, other: &Self) {
        self.reads += other.reads;
        self.windows += other.windows;
        self.counted += other.counted;
        self.missed += other.missed;
        self.invalid += other.invalid;
    }

    /// Every examined window ended up counted, missed, or invalid.
    pub const fn is_conserved(&self) -> bool {
        self.windows == self.counted + self.missed + self.invalid
    }
}

/// Strips trailing line terminators and removes embedded line breaks.
///
/// Borrows the record when there is nothing to remove.
pub fn tokenize(record: &[u8]) -> Cow<'_, [u8]> {
    let is_break = |b: &u8| *b == b'\n' || *b == b'\r';

    let end = record
        .iter()
        .rposition(|b| !is_break(b))
        .map_or(0, |last| last + 1);
    let trimmed = &record[..end];

    if trimmed.iter().any(is_break) {
        Cow::Owned(trimmed.iter().copied().filter(|b| !is_break(b)).collect())
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Number of k-mer windows in a sequence of length `len`: `max(0, len - k + 1)`.
#[inline]
pub const fn num_windows(len: usize, k: usize) -> usize {
    (len + 1).saturating_sub(k)
}

/// Counts every window of one read into `table`, adding the outcomes to `tally`.
pub fn count_read<I>(record: &[u8], table: &CountTable<'_, I>, tally: &mut CountSummary)
where
    I: KmerIndex + ?Sized,
{
    let seq = tokenize(record);
    let k = table.kmer_length().get();
    let windows = num_windows(seq.len(), k);

    tally.reads += 1;
    tally.windows += windows as u64;

    let mut offset = 0;
    while offset < windows {
        match table.increment(&seq[offset..offset + k]) {
            Increment::Counted => {
                tally.counted += 1;
                offset += 1;
            }
            Increment::Missed => {
                tally.missed += 1;
                offset += 1;
            }
            // Windows are always sliced to k bytes
            Increment::WrongLength(_) => {
                tally.invalid += 1;
                offset += 1;
            }
            Increment::Invalid(err) => {
                // Every window up to and including the one starting at the
                // invalid base contains it
                let skipped = (err.position + 1).min(windows - offset);
                tally.invalid += skipped as u64;
                offset += skipped;
            }
        }
    }
}

/// Runs a fixed pool of counting workers over a read stream.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use ixcount::counts::CountTable;
/// use ixcount::dispatch::Dispatcher;
/// use ixcount::index::SortedKmerIndex;
/// use ixcount::kmer::{encode, KmerLength};
/// use ixcount::reader::ReadStream;
///
/// let k = KmerLength::new(3)?;
/// let index = SortedKmerIndex::from_keys(k, vec![encode(b"ACG")?])?;
/// let table = CountTable::new(&index);
/// let stream = ReadStream::from_records(vec![Bytes::from_static(b"ACGTACG")]);
///
/// let summary = Dispatcher::new().workers(2)?.run(&stream, &table)?;
/// stream.finish()?;
///
/// assert_eq!(summary.windows, 5);
/// assert_eq!(table.get(0), Some(3));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    workers: usize,
    report_interval: u64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// A dispatcher with 12 workers reporting every 250 000 reads.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    /// Sets the number of worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`CountError::Config`] if `workers` is zero.
    pub fn workers(mut self, workers: usize) -> Result<Self, CountError> {
        if workers == 0 {
            return Err(CountError::config("at least one worker thread is required"));
        }
        self.workers = workers;
        Ok(self)
    }

    /// Sets how many reads pass between progress reports; zero disables them.
    #[must_use]
    pub const fn report_interval(mut self, reads: u64) -> Self {
        self.report_interval = reads;
        self
    }

    /// The configured number of workers.
    pub const fn worker_count(&self) -> usize {
        self.workers
    }

    /// Counts every read of `stream` into `table`, returning once all
    /// workers are done.
    ///
    /// # Errors
    ///
    /// Returns [`CountError::WorkerPool`] if the threads cannot be started.
    pub fn run<I>(
        &self,
        stream: &ReadStream,
        table: &CountTable<'_, I>,
    ) -> Result<CountSummary, CountError>
    where
        I: KmerIndex + ?Sized,
    {
        self.run_with_progress(stream, table, |_| {})
    }

    /// Like [`run`](Self::run), also handing each progress report to `callback`.
    ///
    /// `callback` runs on whichever worker crosses a reporting boundary.
    ///
    /// # Errors
    ///
    /// Returns [`CountError::WorkerPool`] if the threads cannot be started.
    pub fn run_with_progress<I, F>(
        &self,
        stream: &ReadStream,
        table: &CountTable<'_, I>,
        callback: F,
    ) -> Result<CountSummary, CountError>
    where
        I: KmerIndex + ?Sized,
        F: Fn(Progress) + Sync,
    {
        let _span = info_span!("count_reads", workers = self.workers).entered();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("ixcount-worker-{i}"))
            .build()?;
        let tracker = ProgressTracker::new();

        // One long-running worker per pool thread; returns after all have joined
        let tallies = pool.broadcast(|ctx| {
            self.work(ctx.index(), stream, table, &tracker, &callback)
        });

        let mut summary = CountSummary {
            workers: self.workers,
            ..CountSummary::default()
        };
        for tally in &tallies {
            summary.merge(tally);
        }

        let progress = tracker.snapshot();
        info!(
            reads = summary.reads,
            windows = summary.windows,
            counted = summary.counted,
            missed = summary.missed,
            invalid = summary.invalid,
            elapsed_ms = progress.elapsed.as_millis() as u64,
            "all workers finished"
        );

        Ok(summary)
    }

    fn work<I, F>(
        &self,
        worker: usize,
        stream: &ReadStream,
        table: &CountTable<'_, I>,
        tracker: &ProgressTracker,
        callback: &F,
    ) -> CountSummary
    where
        I: KmerIndex + ?Sized,
        F: Fn(Progress) + Sync,
    {
        let mut tally = CountSummary::default();

        while let Some(record) = stream.fetch() {
            let reads = tracker.record_read();
            if is_report_point(reads, self.report_interval) {
                let progress = tracker.progress_at(reads);
                info!(
                    reads = progress.reads_processed,
                    reads_per_sec = progress.reads_per_sec,
                    "processed reads"
                );
                callback(progress);
            }

            count_read(&record, table, &mut tally);
        }

        debug!(
            worker,
            reads = tally.reads,
            counted = tally.counted,
            "worker done"
        );
        tally
    }
}
