//! The shared supply of reads that counting workers pull from.
//!
//! [`ReadStream`] is a bounded producer/consumer queue. A producer (a parser
//! thread over sequence files, or an in-memory list) pushes one [`Bytes`] per
//! read; any number of workers call [`fetch`](ReadStream::fetch) concurrently.
//! Every read is delivered to exactly one caller. Once the producer is done
//! its sender is dropped, and `fetch` returns `None` to everyone.
//!
//! File format is sniffed from the first byte of the (decompressed) input:
//! `@` means FASTQ, anything else FASTA. A path of `-` reads standard input.

#[cfg(not(feature = "needletail"))]
use std::io::{self, BufRead, BufReader, Read};
use std::{
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::error::CountError;

/// A thread-safe queue of raw read sequences.
#[derive(Debug)]
pub struct ReadStream {
    receiver: Receiver<Bytes>,
    producer: Option<JoinHandle<Result<u64, CountError>>>,
    preloaded: u64,
}

impl ReadStream {
    /// Streams the reads of `paths`, in order, from a background parser thread.
    ///
    /// At most `capacity` parsed reads wait in the queue at any time. Open and
    /// parse failures are reported by [`finish`](Self::finish).
    pub fn from_paths(paths: Vec<PathBuf>, capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        let producer = thread::spawn(move || produce(&paths, &sender));
        Self {
            receiver,
            producer: Some(producer),
            preloaded: 0,
        }
    }

    /// Streams reads that are already in memory.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let (sender, receiver) = unbounded();
        let mut preloaded = 0;
        for record in records {
            if sender.send(record).is_ok() {
                preloaded += 1;
            }
        }
        Self {
            receiver,
            producer: None,
            preloaded,
        }
    }

    /// Blocks until the next read is available, or returns `None` once the
    /// stream is exhausted.
    #[inline]
    pub fn fetch(&self) -> Option<Bytes> {
        self.receiver.recv().ok()
    }

    /// Waits for the producer and returns how many reads it supplied.
    ///
    /// Reads not yet fetched are discarded.
    ///
    /// # Errors
    ///
    /// Returns the producer's open or parse error, or
    /// [`CountError::ReaderPanicked`] if it panicked.
    pub fn finish(self) -> Result<u64, CountError> {
        let Self {
            receiver,
            producer,
            preloaded,
        } = self;
        // Unblocks a producer that is still waiting on a full queue
        drop(receiver);

        match producer {
            Some(handle) => handle.join().map_err(|_| CountError::ReaderPanicked)?,
            None => Ok(preloaded),
        }
    }
}

fn produce(paths: &[PathBuf], sender: &Sender<Bytes>) -> Result<u64, CountError> {
    let mut total = 0;
    for path in paths {
        info!(path = %path.display(), "reading sequences");
        let sent = send_records(path, sender)?;
        debug!(path = %path.display(), records = sent, "finished sequence file");
        total += sent;
    }
    Ok(total)
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> CountError {
    CountError::SequenceParse {
        details: err.to_string(),
        path: path.to_path_buf(),
    }
}

/// Check if a path has a gzip extension (.gz).
#[cfg(all(feature = "gzip", not(feature = "needletail")))]
fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

#[cfg(not(feature = "needletail"))]
fn open(path: &Path) -> Result<Box<dyn BufRead + Send>, CountError> {
    let raw: Box<dyn Read + Send> = if path.as_os_str() == "-" {
        Box::new(io::stdin())
    } else {
        let file = std::fs::File::open(path).map_err(|source| CountError::SequenceRead {
            source,
            path: path.to_path_buf(),
        })?;
        Box::new(file)
    };

    #[cfg(feature = "gzip")]
    let raw: Box<dyn Read + Send> = if is_gzip_path(path) {
        Box::new(flate2::read::MultiGzDecoder::new(raw))
    } else {
        raw
    };

    Ok(Box::new(BufReader::new(raw)))
}

/// Peeks at the first byte without consuming it.
#[cfg(not(feature = "needletail"))]
fn is_fastq(reader: &mut dyn BufRead, path: &Path) -> Result<bool, CountError> {
    let buf = reader.fill_buf().map_err(|source| CountError::SequenceRead {
        source,
        path: path.to_path_buf(),
    })?;
    Ok(buf.first() == Some(&b'@'))
}

#[cfg(not(feature = "needletail"))]
fn send_records(path: &Path, sender: &Sender<Bytes>) -> Result<u64, CountError> {
    use bio::io::{fasta, fastq};

    let mut reader = open(path)?;
    let mut sent = 0;

    if is_fastq(&mut *reader, path)? {
        for record in fastq::Reader::new(reader).records() {
            let record = record.map_err(|e| parse_error(path, e))?;
            if sender.send(Bytes::copy_from_slice(record.seq())).is_err() {
                break;
            }
            sent += 1;
        }
    } else {
        for record in fasta::Reader::new(reader).records() {
            let record = record.map_err(|e| parse_error(path, e))?;
            if sender.send(Bytes::copy_from_slice(record.seq())).is_err() {
                break;
            }
            sent += 1;
        }
    }

    Ok(sent)
}

#[cfg(feature = "needletail")]
fn send_records(path: &Path, sender: &Sender<Bytes>) -> Result<u64, CountError> {
    // needletail detects FASTA/FASTQ and compression on its own
    let parsed = if path.as_os_str() == "-" {
        needletail::parse_fastx_stdin()
    } else {
        needletail::parse_fastx_file(path)
    };
    let mut reader = parsed.map_err(|e| parse_error(path, e))?;

    let mut sent = 0;
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| parse_error(path, e))?;
        if sender.send(Bytes::copy_from_slice(&record.seq())).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
