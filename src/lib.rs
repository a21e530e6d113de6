//! # ixcount
//!
//! Parallel counting of read k-mers against a fixed k-mer index.
//!
//! Every k-mer window of every read is encoded into 2 bits per base,
//! canonicalized (the smaller of the k-mer and its reverse complement), looked
//! up in a read-only index, and counted with a single relaxed atomic add into
//! the slot the index names. Counts are therefore aligned slot-for-slot with
//! the index and can be joined back to k-mer identity downstream.
//!
//! ## Features
//!
//! - Canonical 2-bit k-mers for k = 1..=32
//! - Any index behind the [`KmerIndex`] trait; [`SortedKmerIndex`] ships with
//!   a checksummed on-disk format and a builder
//! - A fixed pool of workers pulling from one bounded read queue
//! - FASTA and FASTQ input, optionally gzip-compressed (`gzip` feature)
//! - Binary, TSV and JSON counts, published atomically
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use ixcount::{count_reads, encode, KmerLength, SortedKmerIndex};
//!
//! let k = KmerLength::new(3)?;
//! let index = SortedKmerIndex::from_keys(k, vec![encode(b"ACG")?])?;
//! let reads = vec![Bytes::from_static(b"ACGTACG")];
//!
//! let (counts, summary) = count_reads(&index, reads, 4)?;
//! assert_eq!(counts, vec![3]);
//! assert!(summary.is_conserved());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rust-bio` (default): FASTA/FASTQ parsing with rust-bio
//! - `needletail`: FASTA/FASTQ parsing with needletail
//! - `gzip`: transparent `.gz` decompression for the rust-bio reader

pub(crate) mod checksum;
pub mod cli;
pub mod config;
pub mod counts;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod kmer;
pub(crate) mod persist;
pub mod progress;
pub mod reader;
pub mod run;

pub use counts::{read_counts, CountTable, DumpFormat, Increment};
pub use dispatch::{CountSummary, Dispatcher};
pub use error::{CountError, InvalidBaseError, KmerLengthError};
pub use index::{load_index, save_index, KmerIndex, SortedKmerIndex};
pub use kmer::{canonicalize, decode, encode, reverse_complement, KmerLength};
pub use progress::{Progress, ProgressTracker};
pub use reader::ReadStream;
pub use run::count_reads;
