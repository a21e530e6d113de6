//! 2-bit k-mer encoding and strand canonicalization.
//!
//! K-mers of length `1..=32` are packed into a `u64`, first base in the most
//! significant position:
//!
//! ```text
//! A -> 00    C -> 01    G -> 10    T -> 11
//! ```
//!
//! The mapping preserves lexicographic order, so the numerically smaller of a
//! k-mer and its reverse complement is also the alphabetically smaller one.
//! Complementing a base is `code ^ 0b11`.
//!
//! # Example
//!
//! ```rust
//! use ixcount::kmer::{canonicalize, decode, encode, KmerLength};
//!
//! let k = KmerLength::new(3)?;
//! let cgt = encode(b"CGT")?;
//! assert_eq!(decode(canonicalize(cgt, k), k), "ACG");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{InvalidBaseError, KmerLengthError};

/// A validated k-mer length in `1..=32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KmerLength(u8);

impl KmerLength {
    /// Minimum supported k-mer length.
    pub const MIN: u8 = 1;
    /// Maximum supported k-mer length (32 bases fill a `u64`).
    pub const MAX: u8 = 32;

    /// Validates `k`.
    ///
    /// # Errors
    ///
    /// Returns [`KmerLengthError`] if `k` is outside `1..=32`.
    pub fn new(k: usize) -> Result<Self, KmerLengthError> {
        match u8::try_from(k) {
            Ok(v) if (Self::MIN..=Self::MAX).contains(&v) => Ok(Self(v)),
            _ => Err(KmerLengthError {
                k,
                min: Self::MIN,
                max: Self::MAX,
            }),
        }
    }

    /// The length as a `usize`.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// The length as a `u8`, as stored in file headers.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Largest encoded value for this length, `4^k - 1`.
    #[must_use]
    pub const fn max_code(self) -> u64 {
        if self.0 == Self::MAX {
            u64::MAX
        } else {
            (1u64 << (2 * self.0 as u32)) - 1
        }
    }
}

impl std::fmt::Display for KmerLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encodes a single base, accepting either case.
#[inline]
const fn encode_base(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'G' | b'g' => Some(0b10),
        b'T' | b't' => Some(0b11),
        _ => None,
    }
}

#[inline]
const fn decode_base(bits: u64) -> u8 {
    match bits & 0b11 {
        0b00 => b'A',
        0b01 => b'C',
        0b10 => b'G',
        _ => b'T',
    }
}

/// Packs k-mer text into its 2-bit integer form.
///
/// The caller is responsible for passing at most 32 bases; longer input
/// shifts the leading bases out of the word.
///
/// # Errors
///
/// Returns [`InvalidBaseError`] for the first byte outside `{A,C,G,T}`
/// (case-insensitive), with its position in `kmer`.
#[inline]
pub fn encode(kmer: &[u8]) -> Result<u64, InvalidBaseError> {
    let mut code = 0u64;
    for (position, &base) in kmer.iter().enumerate() {
        let bits = encode_base(base).ok_or(InvalidBaseError { base, position })?;
        code = (code << 2) | bits;
    }
    Ok(code)
}

/// Reverse complement of a packed k-mer.
#[inline]
#[must_use]
pub const fn reverse_complement(code: u64, k: KmerLength) -> u64 {
    // Complement every base, then reverse the order of the 2-bit groups across
    // the whole word. The high padding bits land at the bottom and are shifted out.
    let mut x = !code;
    x = ((x >> 2) & 0x3333_3333_3333_3333) | ((x & 0x3333_3333_3333_3333) << 2);
    x = ((x >> 4) & 0x0F0F_0F0F_0F0F_0F0F) | ((x & 0x0F0F_0F0F_0F0F_0F0F) << 4);
    x = x.swap_bytes();
    x >> (64 - 2 * k.0 as u32)
}

/// The strand-invariant representative: `min(code, reverse_complement(code))`.
#[inline]
#[must_use]
pub const fn canonicalize(code: u64, k: KmerLength) -> u64 {
    let rc = reverse_complement(code, k);
    if rc < code {
        rc
    } else {
        code
    }
}

/// Unpacks a k-mer into uppercase bytes.
#[must_use]
pub fn decode_bytes(code: u64, k: KmerLength) -> Vec<u8> {
    (0..k.get())
        .rev()
        .map(|i| decode_base(code >> (2 * i)))
        .collect()
}

/// Unpacks a k-mer into an uppercase string.
#[must_use]
pub fn decode(code: u64, k: KmerLength) -> String {
    decode_bytes(code, k).into_iter().map(char::from).collect()
}

/// Text-level reverse complement. Bytes outside the alphabet are kept as-is.
#[must_use]
pub fn reverse_complement_bytes(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            b'a' => b't',
            b'c' => b'g',
            b'g' => b'c',
            b't' => b'a',
            other => other,
        })
        .collect()
}
