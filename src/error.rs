//! Error types for ixcount.
//!
//! Configuration and index failures stop a run before any worker starts,
//! read-source failures surface when the stream is finished, and output
//! failures are fatal at dump time. Per-window problems (invalid bases,
//! k-mers missing from the index) are not errors at this level: workers
//! tally them and move on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in ixcount operations.
#[derive(Debug, Error)]
pub enum CountError {
    /// Invalid or missing inputs.
    #[error("invalid configuration: {details}")]
    Config { details: String },

    /// K-mer length is outside the valid range (1-32).
    #[error("invalid k-mer length {k}: must be between {min} and {max}")]
    InvalidKmerLength { k: usize, min: u8, max: u8 },

    /// Failed to open or read a sequence file.
    #[error("failed to read sequence file '{path}': {source}")]
    SequenceRead {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to parse a sequence record.
    #[error("failed to parse sequence record in '{path}': {details}")]
    SequenceParse { details: String, path: PathBuf },

    /// The thread feeding the read stream panicked.
    #[error("read producer thread panicked")]
    ReaderPanicked,

    /// Failed to start the worker pool.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Failed to read index file.
    #[error("failed to read index file '{path}': {source}")]
    IndexRead {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to write index file.
    #[error("failed to write index file '{path}': {source}")]
    IndexWrite {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Invalid or corrupted index file.
    #[error("invalid index file '{path}': {details}")]
    InvalidIndex { details: String, path: PathBuf },

    /// Failed to write the counts file.
    #[error("failed to write counts file '{path}': {source}")]
    CountsWrite {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to read a counts file.
    #[error("failed to read counts file '{path}': {source}")]
    CountsRead {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// The index cannot name the k-mer held by a slot.
    #[error("index has no key for slot {slot}")]
    UnnamedSlot { slot: usize },

    /// Invalid or corrupted counts file.
    #[error("invalid counts file '{path}': {details}")]
    InvalidCounts { details: String, path: PathBuf },

    /// Failed to write the run summary.
    #[error("failed to write run summary '{path}': {source}")]
    StatsWrite {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to serialize JSON output.
    #[error("failed to serialize JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },
}

impl CountError {
    pub(crate) fn config(details: impl Into<String>) -> Self {
        Self::Config {
            details: details.into(),
        }
    }
}

/// Error for invalid k-mer length.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("k-mer length {k} is out of range: must be between {min} and {max}")]
pub struct KmerLengthError {
    /// The invalid k value that was provided.
    pub k: usize,
    /// Minimum valid k-mer length.
    pub min: u8,
    /// Maximum valid k-mer length.
    pub max: u8,
}

/// Error for a byte outside the nucleotide alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidBaseError {
    /// The invalid byte value.
    pub base: u8,
    /// Position of the invalid byte within the k-mer text.
    pub position: usize,
}

impl std::fmt::Display for InvalidBaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.base.is_ascii_graphic() || self.base == b' ' {
            write!(
                f,
                "invalid base '{}' (0x{:02x}) at position {}",
                self.base as char, self.base, self.position
            )
        } else {
            write!(
                f,
                "invalid base 0x{:02x} at position {}",
                self.base, self.position
            )
        }
    }
}

impl std::error::Error for InvalidBaseError {}

/// Error for an index key that cannot be a packed k-mer of the index's length.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("key {key:#x} does not fit a {k}-mer")]
pub struct InvalidKeyError {
    /// The offending key.
    pub key: u64,
    /// The index's k-mer length.
    pub k: u8,
}

impl From<KmerLengthError> for CountError {
    fn from(err: KmerLengthError) -> Self {
        Self::InvalidKmerLength {
            k: err.k,
            min: err.min,
            max: err.max,
        }
    }
}

impl From<serde_json::Error> for CountError {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source }
    }
}
