//! The k-mer vocabulary that counts are addressed by.
//!
//! Counting only ever talks to an index through [`KmerIndex`]: how many keys
//! it holds, its k-mer length, the dense slot of a canonical k-mer, and the key
//! held by each slot. [`SortedKmerIndex`] is the concrete implementation that
//! ixcount builds and loads: canonical keys in ascending order, slot = rank.
//!
//! # Binary Format (Version 1)
//!
//! ```text
//! +--------+--------+------+----------+------------------+--------+
//! | MAGIC  | VERSION|  K   | NUM_KEYS |      KEYS        | CRC32  |
//! | 4 bytes| 1 byte |1 byte| 8 bytes  | 8 bytes × COUNT  | 4 bytes|
//! +--------+--------+------+----------+------------------+--------+
//!
//! MAGIC:    "KIDX" (0x4B 0x49 0x44 0x58)
//! VERSION:  Format version (currently 1)
//! K:        K-mer length (1-32)
//! NUM_KEYS: Number of keys (little-endian u64)
//! KEYS:     Canonical packed k-mers, strictly increasing (little-endian u64)
//! CRC32:    CRC32 checksum of all preceding bytes (little-endian)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use ixcount::index::{load_index, save_index, KmerIndex, SortedKmerIndex};
//! use ixcount::kmer::KmerLength;
//!
//! let index = SortedKmerIndex::from_keys(KmerLength::new(4)?, vec![0b00_01_10_11])?;
//! save_index(&index, "transcripts.kidx")?;
//!
//! let loaded = load_index("transcripts.kidx")?;
//! assert_eq!(loaded.num_keys(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use bytes::Bytes;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    checksum::{crc32, Crc32Writer},
    error::{CountError, InvalidKeyError},
    kmer::{canonicalize, encode, KmerLength},
    persist::write_atomically,
};

/// Magic bytes identifying an ixcount index file.
const MAGIC: &[u8; 4] = b"KIDX";

/// Current format version.
const VERSION: u8 = 1;

/// Header: magic + version + k + key count.
const HEADER_LEN: usize = 4 + 1 + 1 + 8;

/// Read-only mapping from canonical k-mers to dense slots.
///
/// Implementations are shared by reference across all counting workers, so
/// they must be `Sync` and must not change for the lifetime of a run.
pub trait KmerIndex: Sync {
    /// Number of keys, i.e. slots in `[0, num_keys)`.
    fn num_keys(&self) -> usize;

    /// Length of every key in the index.
    fn kmer_length(&self) -> KmerLength;

    /// Slot of a canonical k-mer, or `None` if it is not part of the index.
    fn lookup(&self, canonical: u64) -> Option<usize>;

    /// Key held by `slot`, in the index's own enumeration order.
    fn key(&self, slot: usize) -> Option<u64>;
}

/// A k-mer index over canonical keys sorted in ascending order.
#[derive(Debug, Clone)]
pub struct SortedKmerIndex {
    k: KmerLength,
    keys: Vec<u64>,
    slots: FxHashMap<u64, usize>,
}

impl SortedKmerIndex {
    /// Creates an index from arbitrary packed k-mers.
    ///
    /// Keys are canonicalized, sorted and deduplicated, so a k-mer and its
    /// reverse complement name the same slot.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidKeyError`] for a key wider than `2k` bits.
    pub fn from_keys(k: KmerLength, keys: Vec<u64>) -> Result<Self, InvalidKeyError> {
        let mut keys = keys
            .into_iter()
            .map(|key| {
                if key > k.max_code() {
                    Err(InvalidKeyError {
                        key,
                        k: k.as_u8(),
                    })
                } else {
                    Ok(canonicalize(key, k))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        keys.par_sort_unstable();
        keys.dedup();
        Ok(Self::from_sorted(k, keys))
    }

    /// Builds an index over every canonical k-mer occurring in `sequences`.
    ///
    /// Windows containing bases outside `{A,C,G,T}` are skipped.
    pub fn build_from_sequences(sequences: &[Bytes], k: KmerLength) -> Self {
        let set = sequences
            .par_iter()
            .fold(FxHashSet::default, |mut set, seq| {
                collect_canonical(seq, k, &mut set);
                set
            })
            .reduce(FxHashSet::default, |mut a, mut b| {
                if a.len() < b.len() {
                    std::mem::swap(&mut a, &mut b);
                }
                a.extend(b);
                a
            });

        let mut keys: Vec<u64> = set.into_iter().collect();
        keys.par_sort_unstable();
        Self::from_sorted(k, keys)
    }

    fn from_sorted(k: KmerLength, keys: Vec<u64>) -> Self {
        let slots = keys
            .iter()
            .enumerate()
            .map(|(slot, &key)| (key, slot))
            .collect();
        Self { k, keys, slots }
    }

    /// The keys in slot order.
    #[must_use]
    pub fn keys(&self) -> &[u64] {
        &self.keys
    }

    /// Returns true if the index holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KmerIndex for SortedKmerIndex {
    fn num_keys(&self) -> usize {
        self.keys.len()
    }

    fn kmer_length(&self) -> KmerLength {
        self.k
    }

    #[inline]
    fn lookup(&self, canonical: u64) -> Option<usize> {
        self.slots.get(&canonical).copied()
    }

    fn key(&self, slot: usize) -> Option<u64> {
        self.keys.get(slot).copied()
    }
}

fn collect_canonical(seq: &[u8], k: KmerLength, keys: &mut FxHashSet<u64>) {
    let k_val = k.get();
    if seq.len() < k_val {
        return;
    }

    let mut i = 0;
    while i <= seq.len() - k_val {
        match encode(&seq[i..i + k_val]) {
            Ok(code) => {
                keys.insert(canonicalize(code, k));
                i += 1;
            }
            Err(err) => {
                // Skip past the invalid base
                i += err.position + 1;
            }
        }
    }
}

/// Saves an index, publishing the file only once it is completely written.
///
/// # Errors
///
/// Returns [`CountError::IndexWrite`] if the file cannot be created or written.
pub fn save_index<P: AsRef<Path>>(index: &SortedKmerIndex, path: P) -> Result<(), CountError> {
    let path = path.as_ref();

    write_atomically(path, |writer| {
        let mut crc = Crc32Writer::new(writer);
        crc.write_all(MAGIC)?;
        crc.write_all(&[VERSION, index.k.as_u8()])?;
        crc.write_all(&(index.keys.len() as u64).to_le_bytes())?;
        for key in &index.keys {
            crc.write_all(&key.to_le_bytes())?;
        }
        crc.finish()?;
        Ok(())
    })
    .map_err(|source| CountError::IndexWrite {
        source,
        path: path.to_path_buf(),
    })
}

/// Loads and validates an index file.
///
/// # Errors
///
/// Returns [`CountError::IndexRead`] if the file cannot be read, and
/// [`CountError::InvalidIndex`] if it is not a well-formed index (bad magic,
/// version, k, size, checksum, or key order).
pub fn load_index<P: AsRef<Path>>(path: P) -> Result<SortedKmerIndex, CountError> {
    let path = path.as_ref();
    let invalid = |details: String| CountError::InvalidIndex {
        details,
        path: path.to_path_buf(),
    };

    let mut data = Vec::new();
    File::open(path)
        .and_then(|file| BufReader::new(file).read_to_end(&mut data))
        .map_err(|source| CountError::IndexRead {
            source,
            path: path.to_path_buf(),
        })?;

    if data.len() < HEADER_LEN + 4 {
        return Err(invalid("file too small".into()));
    }

    // Check magic first (before CRC) to give better error for non-index files
    if &data[..4] != MAGIC {
        return Err(invalid(
            "invalid magic bytes (not an ixcount index file)".into(),
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
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| invalid(format!("key count {num_keys} is too large")))?;
    if body.len() != expected {
        return Err(invalid(format!(
            "data size mismatch (expected {expected} bytes, got {} bytes)",
            body.len()
        )));
    }

    let mut keys = Vec::with_capacity(body.len() / 8);
    for chunk in body.chunks_exact(8) {
        let key = read_u64(chunk).unwrap_or_default();
        if key > k.max_code() || canonicalize(key, k) != key {
            return Err(invalid(format!("key {key:#x} is not a canonical {k}-mer")));
        }
        if keys.last().is_some_and(|&prev| prev >= key) {
            return Err(invalid(format!("key {key:#x} is out of order")));
        }
        keys.push(key);
    }

    Ok(SortedKmerIndex::from_sorted(k, keys))
}

fn read_u64(bytes: &[u8]) -> Option<u64> {
    bytes.get(..8)?.try_into().ok().map(u64::from_le_bytes)
}

fn read_u32(bytes: &[u8]) -> Option<u32> {
    bytes.get(..4)?.try_into().ok().map(u32::from_le_bytes)
}
