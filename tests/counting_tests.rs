//! End-to-end counting behaviour through the public library API.

use bytes::Bytes;
use ixcount::kmer::reverse_complement_bytes;
use ixcount::{
    count_reads, encode, CountSummary, CountTable, Dispatcher, KmerIndex, KmerLength,
    ReadStream, SortedKmerIndex,
};
use std::collections::HashMap;

/// Every possible k-mer is its own slot: slot = packed code.
///
/// Only canonical slots can ever be hit.
struct EveryKmer {
    k: KmerLength,
}

impl KmerIndex for EveryKmer {
    fn num_keys(&self) -> usize {
        1 << (2 * self.k.get())
    }

    fn kmer_length(&self) -> KmerLength {
        self.k
    }

    fn lookup(&self, canonical: u64) -> Option<usize> {
        usize::try_from(canonical)
            .ok()
            .filter(|&slot| slot < self.num_keys())
    }

    fn key(&self, slot: usize) -> Option<u64> {
        (slot < self.num_keys()).then_some(slot as u64)
    }
}

fn k(n: usize) -> KmerLength {
    KmerLength::new(n).unwrap()
}

fn index_of(n: usize, kmers: &[&[u8]]) -> SortedKmerIndex {
    let keys = kmers.iter().map(|kmer| encode(kmer).unwrap()).collect();
    SortedKmerIndex::from_keys(k(n), keys).unwrap()
}

fn reads(seqs: &[&'static [u8]]) -> Vec<Bytes> {
    seqs.iter().map(|s| Bytes::from_static(s)).collect()
}

/// Deterministic xorshift generator for synthetic reads.
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn sequence(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[(self.next() % 4) as usize]).collect()
    }
}

/// Straightforward string-based counting to compare against.
fn naive_counts(seqs: &[Bytes], k: usize) -> HashMap<Vec<u8>, u64> {
    let mut counts = HashMap::new();
    for seq in seqs {
        for window in seq.windows(k) {
            if !window.iter().all(|b| b"ACGT".contains(b)) {
                continue;
            }
            let rc = reverse_complement_bytes(window);
            let canonical = window.to_vec().min(rc);
            *counts.entry(canonical).or_default() += 1;
        }
    }
    counts
}

#[test]
fn scenario_single_read_counts_every_window() {
    // ACG CGT GTA TAC ACG: ACG/CGT share a slot, GTA/TAC share another
    let index = index_of(3, &[b"ACG", b"GTA"]);
    let (counts, summary) = count_reads(&index, reads(&[b"ACGTACG"]), 4).unwrap();

    assert_eq!(summary.windows, 5);
    let acg = index.lookup(encode(b"ACG").unwrap()).unwrap();
    let gta = index.lookup(encode(b"GTA").unwrap()).unwrap();
    assert!(counts[acg] >= 2);
    assert_eq!(counts[acg], 3);
    assert_eq!(counts[gta], 2);
    assert_eq!(counts.iter().sum::<u64>(), 5);
}

#[test]
fn scenario_short_read_contributes_nothing() {
    let index = index_of(5, &[b"ACGTA"]);
    let (counts, summary) = count_reads(&index, reads(&[b"ACG"]), 2).unwrap();

    assert_eq!(counts, vec![0]);
    assert_eq!(summary.reads, 1);
    assert_eq!(summary.windows, 0);
}

#[test]
fn scenario_reverse_complement_doubles_counts() {
    let seq: &'static [u8] = b"GATTACAGGCT";
    let rc = Bytes::from(reverse_complement_bytes(seq));
    let index = SortedKmerIndex::build_from_sequences(&[Bytes::from_static(seq)], k(4));

    let (single, _) = count_reads(&index, reads(&[seq]), 3).unwrap();
    let (both, _) = count_reads(&index, vec![Bytes::from_static(seq), rc], 3).unwrap();

    let doubled: Vec<u64> = single.iter().map(|c| c * 2).collect();
    assert_eq!(both, doubled);
}

#[test]
fn scenario_many_reads_are_worker_count_independent() {
    let mut rng = Xorshift(0x9E37_79B9_7F4A_7C15);
    let transcripts: Vec<Bytes> = (0..50).map(|_| Bytes::from(rng.sequence(300))).collect();
    let index = SortedKmerIndex::build_from_sequences(&transcripts, k(21));

    let reads: Vec<Bytes> = (0..100_000)
        .map(|i| {
            if i % 2 == 0 {
                // Half the reads come from a transcript, half are noise
                let tx = &transcripts[(rng.next() % 50) as usize];
                let start = (rng.next() % 200) as usize;
                tx.slice(start..start + 100)
            } else {
                Bytes::from(rng.sequence(100))
            }
        })
        .collect();

    let (one, one_summary) = count_reads(&index, reads.clone(), 1).unwrap();
    let (twelve, twelve_summary) = count_reads(&index, reads, 12).unwrap();

    assert_eq!(one, twelve);
    assert_eq!(one_summary.counted, twelve_summary.counted);
    assert_eq!(one_summary.missed, twelve_summary.missed);
    assert_eq!(twelve_summary.reads, 100_000);
    assert_eq!(twelve_summary.windows, 100_000 * 80);
}

#[test]
fn counts_match_naive_reference() {
    let mut rng = Xorshift(42);
    let seqs: Vec<Bytes> = (0..200).map(|_| Bytes::from(rng.sequence(60))).collect();
    let index = EveryKmer { k: k(5) };

    let (counts, summary) = count_reads(&index, seqs.clone(), 4).unwrap();
    let expected = naive_counts(&seqs, 5);

    for (kmer, count) in expected {
        let slot = encode(&kmer).unwrap() as usize;
        assert_eq!(counts[slot], count, "{}", String::from_utf8_lossy(&kmer));
    }
    assert_eq!(summary.missed, 0);
    assert_eq!(counts.iter().sum::<u64>(), summary.counted);
}

#[test]
fn conservation_holds_with_misses_and_invalid_bases() {
    let index = index_of(3, &[b"AAA", b"ACG"]);
    let input = reads(&[b"ACGNACG", b"AAAAC", b"NNNN", b"acgt", b"AC\nGT\r\n"]);

    let (counts, summary) = count_reads(&index, input, 3).unwrap();

    assert!(summary.is_conserved());
    assert_eq!(counts.iter().sum::<u64>(), summary.counted);
    assert!(summary.invalid > 0);
    assert!(summary.missed > 0);
}

#[test]
fn invalid_base_skips_only_covering_windows() {
    let index = index_of(3, &[b"ACG"]);
    let (counts, summary) = count_reads(&index, reads(&[b"ACGNACG"]), 1).unwrap();

    assert_eq!(
        summary,
        CountSummary {
            workers: 1,
            reads: 1,
            windows: 5,
            counted: 2,
            missed: 0,
            invalid: 3,
        }
    );
    assert_eq!(counts, vec![2]);
}

#[test]
fn missing_kmers_are_tallied_not_counted() {
    let index = index_of(4, &[b"GGGG"]);
    let (counts, summary) = count_reads(&index, reads(&[b"ACGTAC"]), 2).unwrap();

    assert_eq!(counts, vec![0]);
    assert_eq!(summary.missed, 3);
    assert_eq!(summary.counted, 0);
}

#[test]
fn lowercase_and_line_breaks_are_tolerated() {
    let index = index_of(3, &[b"ACG"]);
    let (counts, summary) = count_reads(&index, reads(&[b"ac\ngt\r\n"]), 2).unwrap();

    assert_eq!(summary.windows, 2);
    assert_eq!(counts, vec![2]);
}

#[test]
fn empty_stream_leaves_table_zeroed() {
    let index = index_of(3, &[b"ACG", b"AAA"]);
    let (counts, summary) = count_reads(&index, Vec::new(), 12).unwrap();

    assert_eq!(counts, vec![0, 0]);
    assert_eq!(summary.reads, 0);
}

#[test]
fn table_borrows_index_for_whole_run() {
    let index = index_of(3, &[b"ACG"]);
    let table = CountTable::new(&index);
    let stream = ReadStream::from_records(reads(&[b"ACG", b"CGT"]));

    let summary = Dispatcher::new()
        .workers(2)
        .unwrap()
        .run(&stream, &table)
        .unwrap();
    assert_eq!(stream.finish().unwrap(), 2);

    assert_eq!(summary.counted, 2);
    assert_eq!(table.total(), 2);
    assert_eq!(table.index().num_keys(), 1);
}
