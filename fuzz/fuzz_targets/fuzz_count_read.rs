//! Fuzz target for counting a single arbitrary read.
//!
//! Whatever the bytes, every window must be accounted for exactly once and
//! the counters must agree with the tally.

#![no_main]

use ixcount::dispatch::{count_read, num_windows, tokenize, CountSummary};
use ixcount::kmer::{encode, KmerLength};
use ixcount::{CountTable, SortedKmerIndex};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&k, read)) = data.split_first() else {
        return;
    };
    let Ok(k) = KmerLength::new(usize::from(k % 8) + 1) else {
        return;
    };
    let keys = [b"ACGTACGT", b"AAAAAAAA", b"GATTACAG"]
        .iter()
        .map(|kmer| encode(&kmer[..k.get()]).unwrap())
        .collect();
    let index = SortedKmerIndex::from_keys(k, keys).unwrap();
    let table = CountTable::new(&index);

    let mut tally = CountSummary::default();
    count_read(read, &table, &mut tally);

    assert_eq!(tally.windows, num_windows(tokenize(read).len(), k.get()) as u64);
    assert!(tally.is_conserved());
    assert_eq!(table.total(), tally.counted);
});
