//! Fuzz target for canonical k-mer computation.
//!
//! Checks that the canonical form:
//! 1. is idempotent
//! 2. is shared by a k-mer and its reverse complement
//! 3. decodes to the lexicographically smaller strand

#![no_main]

use ixcount::kmer::{canonicalize, decode, encode, reverse_complement_bytes, KmerLength};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(k) = KmerLength::new(data.len()) else {
        return;
    };
    // Arbitrary bytes must be rejected, never panic
    let Ok(code) = encode(data) else {
        return;
    };

    let canonical = canonicalize(code, k);
    assert_eq!(canonicalize(canonical, k), canonical, "not idempotent");

    let rc = reverse_complement_bytes(data);
    let rc_code = encode(&rc).unwrap();
    assert_eq!(canonicalize(rc_code, k), canonical, "strands disagree");

    let upper = data.to_ascii_uppercase();
    let rc_upper = rc.to_ascii_uppercase();
    let smallest = if upper <= rc_upper { upper } else { rc_upper };
    assert_eq!(decode(canonical, k).into_bytes(), smallest);
});
