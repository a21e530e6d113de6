//! End-to-end runs behind each subcommand.
//!
//! `count`: load index → open read stream → dispatch workers → dump counts.
//! The index and the counters live on this function's stack for the whole
//! run; workers only ever borrow them.

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Instant,
};

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::{
    config::{CountConfig, IndexConfig},
    counts::{CountTable, DumpSummary},
    dispatch::{CountSummary, Dispatcher},
    error::CountError,
    index::{load_index, save_index, KmerIndex, SortedKmerIndex},
    persist::write_atomically,
    reader::ReadStream,
};

/// Parsed reads waiting in the queue, per worker.
pub const QUEUE_DEPTH_PER_WORKER: usize = 256;

/// Everything a finished `count` run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Index file the reads were counted against.
    pub index: PathBuf,
    /// K-mer length of the index.
    pub k: u8,
    /// Number of slots in the index.
    pub num_keys: usize,
    /// Read files, in the order they were streamed.
    pub read_files: Vec<PathBuf>,
    /// Where the counts were written.
    pub counts: PathBuf,
    /// Counts file format.
    pub format: String,
    /// Reads the parser produced; equals `summary.reads` on success.
    pub reads_supplied: u64,
    /// Merged worker tallies.
    pub summary: CountSummary,
    /// What the dump wrote.
    pub dump: DumpSummary,
    /// Wall-clock time from index load to finished dump.
    pub elapsed_secs: f64,
}

/// Counts the reads of `config` against its index and writes the counts.
///
/// # Errors
///
/// Fails if the index cannot be loaded, the workers cannot be started, a read
/// file cannot be opened or parsed, or the counts (or stats) cannot be written.
/// Nothing is written to the counts path unless every read was counted.
pub fn run_count(config: &CountConfig) -> Result<RunSummary, CountError> {
    let _span = info_span!("count", index = %config.index.display()).entered();
    let start = Instant::now();

    let index = load_index(&config.index)?;
    info!(num_keys = index.num_keys(), "index contained {} kmers", index.num_keys());
    if index.is_empty() {
        warn!("index is empty, every k-mer will be dropped");
    }

    let dispatcher = Dispatcher::new()
        .workers(config.workers)?
        .report_interval(config.report_interval);

    for path in &config.reads {
        info!(path = %path.display(), "read file");
    }
    let stream = ReadStream::from_paths(
        config.reads.clone(),
        QUEUE_DEPTH_PER_WORKER * dispatcher.worker_count(),
    );

    let table = CountTable::new(&index);
    // Parse failures must stop the run before anything is dumped, so the
    // producer is joined even when dispatch itself fails
    let counted = dispatcher.run(&stream, &table);
    let reads_supplied = stream.finish()?;
    let summary = counted?;

    let dump = table.dump(&config.counts, config.format)?;
    info!(
        path = %config.counts.display(),
        format = %config.format,
        slots = dump.slots,
        nonzero = dump.nonzero,
        total = dump.total,
        "wrote counts"
    );

    let run = RunSummary {
        index: config.index.clone(),
        k: index.kmer_length().as_u8(),
        num_keys: index.num_keys(),
        read_files: config.reads.clone(),
        counts: config.counts.clone(),
        format: config.format.to_string(),
        reads_supplied,
        summary,
        dump,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };

    if let Some(path) = &config.stats {
        write_stats(path, &run)?;
        info!(path = %path.display(), "wrote run summary");
    }

    Ok(run)
}

/// Builds an index over the canonical k-mers of the transcripts and saves it.
///
/// Returns the number of keys in the new index.
///
/// # Errors
///
/// Fails if the transcripts cannot be read or the index cannot be written.
pub fn run_index(config: &IndexConfig) -> Result<usize, CountError> {
    let _span = info_span!("index", k = config.k.get()).entered();

    let stream = ReadStream::from_paths(vec![config.transcripts.clone()], 1024);
    let sequences: Vec<Bytes> = std::iter::from_fn(|| stream.fetch()).collect();
    let supplied = stream.finish()?;
    info!(sequences = supplied, "read transcripts");

    let index = match config.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?
            .install(|| SortedKmerIndex::build_from_sequences(&sequences, config.k)),
        None => SortedKmerIndex::build_from_sequences(&sequences, config.k),
    };

    save_index(&index, &config.output)?;
    info!(
        path = %config.output.display(),
        num_keys = index.num_keys(),
        "wrote index"
    );

    Ok(index.num_keys())
}

/// Counts in-memory reads against `index` and returns the per-slot counts.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use ixcount::index::SortedKmerIndex;
/// use ixcount::kmer::KmerLength;
/// use ixcount::run::count_reads;
///
/// let k = KmerLength::new(3)?;
/// let index = SortedKmerIndex::build_from_sequences(&[Bytes::from_static(b"ACGT")], k);
/// let (counts, summary) = count_reads(&index, vec![Bytes::from_static(b"ACGT")], 2)?;
///
/// // ACG and CGT are reverse complements and share a slot
/// assert_eq!(counts, vec![2]);
/// assert_eq!(summary.counted, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Errors
///
/// Returns [`CountError::Config`] for zero workers, or
/// [`CountError::WorkerPool`] if the threads cannot be started.
pub fn count_reads<I, R>(
    index: &I,
    reads: R,
    workers: usize,
) -> Result<(Vec<u64>, CountSummary), CountError>
where
    I: KmerIndex + ?Sized,
    R: IntoIterator<Item = Bytes>,
{
    let dispatcher = Dispatcher::new().workers(workers)?;
    let stream = ReadStream::from_records(reads);
    let table = CountTable::new(index);
    let summary = dispatcher.run(&stream, &table)?;
    stream.finish()?;
    Ok((table.into_counts(), summary))
}

fn write_stats(path: &Path, run: &RunSummary) -> Result<(), CountError> {
    let mut json_error = None;
    write_atomically(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, run).map_err(|e| {
            let io = std::io::Error::other(e.to_string());
            json_error = Some(e);
            io
        })?;
        writeln!(writer)
    })
    .map_err(|source| match json_error.take() {
        Some(source) => CountError::Json { source },
        None => CountError::StatsWrite {
            source,
            path: path.to_path_buf(),
        },
    })
}
