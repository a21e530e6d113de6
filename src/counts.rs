//! Per-slot k-mer counters and the counts file they are dumped to.
//!
//! A [`CountTable`] holds one `AtomicU64` per key of a [`KmerIndex`]. Workers
//! share it by reference and only ever add to it; it is read once, at
//! [`dump`](CountTable::dump), after every worker has been joined.
//!
//! # Binary Format (Version 1)
//!
//! ```text
//! +--------+--------+------+----------+---------------------+--------+
//! | MAGIC  | VERSION|  K   | NUM_KEYS |      RECORDS        | CRC32  |
//! | 4 bytes| 1 byte |1 byte| 8 bytes  | 16 bytes × NUM_KEYS | 4 bytes|
//! +--------+--------+------+----------+---------------------+--------+
//!
//! MAGIC:    "KCNT" (0x4B 0x43 0x4E 0x54)
//! VERSION:  Format version (currently 1)
//! K:        K-mer length (1-32)
//! NUM_KEYS: Number of slots (little-endian u64)
//! RECORDS:  (canonical key: u64, count: u64) pairs in slot order (little-endian)
//! CRC32:    CRC32 checksum of all preceding bytes (little-endian)
//! ```
//!
//! Records follow the index's slot order, so the i-th record of a counts file
//! belongs to the i-th key of the index it was counted against.

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use clap::ValueEnum;
use serde::Serialize;

use crate::{
    checksum::{crc32, Crc32Writer},
    error::{CountError, InvalidBaseError},
    index::KmerIndex,
    kmer::{canonicalize, decode, encode, KmerLength},
    persist::write_atomically,
};

/// Magic bytes identifying an ixcount counts file.
const MAGIC: &[u8; 4] = b"KCNT";

/// Current format version.
const VERSION: u8 = 1;

/// Header: magic + version + k + slot count.
const HEADER_LEN: usize = 4 + 1 + 1 + 8;

/// Outcome of a single [`CountTable::increment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    /// The canonical k-mer's slot was incremented.
    Counted,
    /// The canonical k-mer is not in the index; nothing was counted.
    Missed,
    /// The window contains a byte outside the alphabet; nothing was counted.
    Invalid(InvalidBaseError),
    /// The window is not exactly `kmer_length()` bytes; nothing was counted.
    WrongLength(usize),
}

/// Output layout of the counts file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DumpFormat {
    /// Checksummed binary records (see module docs)
    #[default]
    Binary,
    /// Tab-separated values (kmer\tcount), one line per slot
    Tsv,
    /// JSON object with k, num_keys and the per-slot counts
    Json,
}

impl std::fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Tsv => write!(f, "tsv"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// What a dump wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DumpSummary {
    /// Number of slots written.
    pub slots: usize,
    /// Sum of all counters.
    pub total: u64,
    /// Slots with a non-zero count.
    pub nonzero: usize,
}

/// Fixed-size atomic counters, one per key of a borrowed index.
pub struct CountTable<'a, I: KmerIndex + ?Sized> {
    index: &'a I,
    k: KmerLength,
    counters: Box<[AtomicU64]>,
}

impl<'a, I: KmerIndex + ?Sized> CountTable<'a, I> {
    /// Allocates `index.num_keys()` zeroed counters.
    pub fn new(index: &'a I) -> Self {
        let counters = (0..index.num_keys()).map(|_| AtomicU64::new(0)).collect();
        Self {
            index,
            k: index.kmer_length(),
            counters,
        }
    }

    /// The index the table counts against.
    pub const fn index(&self) -> &'a I {
        self.index
    }

    /// The index's k-mer length.
    pub const fn kmer_length(&self) -> KmerLength {
        self.k
    }

    /// Number of counters.
    pub fn num_keys(&self) -> usize {
        self.counters.len()
    }

    /// Canonicalizes `kmer`, looks up its slot and adds one to it.
    ///
    /// Anything other than exactly `kmer_length()` bytes is rejected with
    /// [`Increment::WrongLength`].
    #[inline]
    pub fn increment(&self, kmer: &[u8]) -> Increment {
        if kmer.len() != self.k.get() {
            return Increment::WrongLength(kmer.len());
        }
        match encode(kmer) {
            Ok(code) => self.increment_encoded(code),
            Err(err) => Increment::Invalid(err),
        }
    }

    /// Like [`increment`](Self::increment) for an already-encoded forward k-mer.
    #[inline]
    pub fn increment_encoded(&self, code: u64) -> Increment {
        match self.index.lookup(canonicalize(code, self.k)) {
            Some(slot) => match self.counters.get(slot) {
                Some(counter) => {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Increment::Counted
                }
                None => Increment::Missed,
            },
            None => Increment::Missed,
        }
    }

    /// Current value of one slot.
    pub fn get(&self, slot: usize) -> Option<u64> {
        self.counters.get(slot).map(|c| c.load(Ordering::Relaxed))
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Copies the counters out, in slot order.
    pub fn snapshot(&self) -> Vec<u64> {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// Consumes the table, returning the counters in slot order.
    pub fn into_counts(self) -> Vec<u64> {
        self.counters
            .into_vec()
            .into_iter()
            .map(AtomicU64::into_inner)
            .collect()
    }

    /// Writes every slot's key and count to `path`, in slot order.
    ///
    /// The file only appears at `path` once it has been written completely.
    ///
    /// # Errors
    ///
    /// Returns [`CountError::UnnamedSlot`] before anything is written if the
    /// index has no key for a slot, [`CountError::CountsWrite`] on any I/O
    /// failure, or [`CountError::Json`] if JSON serialization fails.
    pub fn dump<P: AsRef<Path>>(
        self,
        path: P,
        format: DumpFormat,
    ) -> Result<DumpSummary, CountError> {
        let path = path.as_ref();
        let index = self.index;
        let k = self.k;
        let counts = self.into_counts();

        let summary = DumpSummary {
            slots: counts.len(),
            total: counts.iter().sum(),
            nonzero: counts.iter().filter(|&&c| c > 0).count(),
        };

        // Every slot must name its k-mer, or the file cannot be joined back
        let keys = (0..counts.len())
            .map(|slot| index.key(slot).ok_or(CountError::UnnamedSlot { slot }))
            .collect::<Result<Vec<u64>, _>>()?;
        let records = || keys.iter().copied().zip(counts.iter().copied());

        let mut json_error = None;
        write_atomically(path, |writer| match format {
            DumpFormat::Binary => {
                let mut crc = Crc32Writer::new(writer);
                crc.write_all(MAGIC)?;
                crc.write_all(&[VERSION, k.as_u8()])?;
                crc.write_all(&(counts.len() as u64).to_le_bytes())?;
                for (key, count) in records() {
                    crc.write_all(&key.to_le_bytes())?;
                    crc.write_all(&count.to_le_bytes())?;
                }
                crc.finish()?;
                Ok(())
            }
            DumpFormat::Tsv => {
                writeln!(writer, "#k={k}\tnum_keys={}", counts.len())?;
                for (key, count) in records() {
                    writeln!(writer, "{}\t{count}", decode(key, k))?;
                }
                Ok(())
            }
            DumpFormat::Json => {
                let doc = JsonCounts {
                    k: k.as_u8(),
                    num_keys: counts.len(),
                    counts: records()
                        .map(|(key, count)| KmerCount {
                            kmer: decode(key, k),
                            count,
                        })
                        .collect(),
                };
                serde_json::to_writer_pretty(&mut *writer, &doc).map_err(|e| {
                    let io = std::io::Error::other(e.to_string());
                    json_error = Some(e);
                    io
                })?;
                writeln!(writer)
            }
        })
        .map_err(|source| match json_error.take() {
            Some(source) => CountError::Json { source },
            None => CountError::CountsWrite {
                source,
                path: path.to_path_buf(),
            },
        })?;

        Ok(summary)
    }
}

/// A k-mer with its count, used for JSON output.
#[derive(Serialize)]
struct KmerCount {
    kmer: String,
    count: u64,
}

#[derive(Serialize)]
struct JsonCounts {
    k: u8,
    num_keys: usize,
    counts: Vec<KmerCount>,
}

/// A binary counts file read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountsFile {
    /// K-mer length the counts were taken with.
    pub k: KmerLength,
    /// `(canonical key, count)` in slot order.
    pub records: Vec<(u64, u64)>,
}

impl CountsFile {
    /// The counts alone, in slot order.
    pub fn counts(&self) -> Vec<u64> {
        self.records.iter().map(|&(_, count)| count).collect()
    }
}

/// Reads and validates a binary counts file.
///
/// # Errors
///
/// Returns [`CountError::CountsRead`] if the file cannot be read, and
/// [`CountError::InvalidCounts`] if it is malformed.
pub fn read_counts<P: AsRef<Path>>(path: P) -> Result<CountsFile, CountError> {
    let path = path.as_ref();
    let invalid = |details: String| CountError::InvalidCounts {
        details,
        path: path.to_path_buf(),
    };

    let mut data = Vec::new();
    File::open(path)
        .and_then(|file| BufReader::new(file).read_to_end(&mut data))
        .map_err(|source| CountError::CountsRead {
            source,
            path: path.to_path_buf(),
        })?;

    if data.len() < HEADER_LEN + 4 {
        return Err(invalid("file too small".into()));
    }
    if &data[..4] != MAGIC {
        return Err(invalid(
            "invalid magic bytes (not an ixcount counts file)".into(),
        ));
    }

    let (content, trailer) = data.split_at(data.len() - 4);
    let stored = read_u32(trailer).unwrap_or_default();
    let computed = crc32(content);
    if stored != computed {
        return Err(invalid(format!(
            "checksum mismatch (expected {stored:#x}, got {computed:#x})"
        )));
    }

    if content[4] != VERSION {
        return Err(invalid(format!("unsupported version {}", content[4])));
    }
    let k = KmerLength::new(usize::from(content[5]))
        .map_err(|e| invalid(format!("invalid k-mer length: {e}")))?;

    let num_keys = read_u64(&content[6..]).unwrap_or_default();
    let body = &content[HEADER_LEN..];
    let expected = usize::try_from(num_keys)
        .ok()
        .and_then(|n| n.checked_mul(16))
        .ok_or_else(|| invalid(format!("slot count {num_keys} is too large")))?;
    if body.len() != expected {
        return Err(invalid(format!(
            "data size mismatch (expected {expected} bytes, got {} bytes)",
            body.len()
        )));
    }

    let records = body
        .chunks_exact(16)
        .map(|chunk| {
            (
                read_u64(chunk).unwrap_or_default(),
                read_u64(&chunk[8..]).unwrap_or_default(),
            )
        })
        .collect();

    Ok(CountsFile { k, records })
}

fn read_u64(bytes: &[u8]) -> Option<u64> {
    bytes.get(..8)?.try_into().ok().map(u64::from_le_bytes)
}

fn read_u32(bytes: &[u8]) -> Option<u32> {
    bytes.get(..4)?.try_into().ok().map(u32::from_le_bytes)
}
