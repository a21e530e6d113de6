//! Index and counts files: round trips, rejection of damaged files, and
//! atomic publication.

use bytes::Bytes;
use ixcount::{
    count_reads, encode, load_index, read_counts, save_index, CountError, CountTable, DumpFormat,
    KmerIndex, KmerLength, SortedKmerIndex,
};
use std::fs;
use tempfile::tempdir;

fn k(n: usize) -> KmerLength {
    KmerLength::new(n).unwrap()
}

fn sample_index() -> SortedKmerIndex {
    let transcripts = [
        Bytes::from_static(b"ACGTACGGTTCAGCATGCA"),
        Bytes::from_static(b"GGGCCCAAATTTACGTAC"),
    ];
    SortedKmerIndex::build_from_sequences(&transcripts, k(5))
}

#[test]
fn index_file_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tx.kidx");
    let index = sample_index();

    save_index(&index, &path).unwrap();
    let loaded = load_index(&path).unwrap();

    assert_eq!(loaded.kmer_length(), index.kmer_length());
    assert_eq!(loaded.keys(), index.keys());
    for (slot, &key) in index.keys().iter().enumerate() {
        assert_eq!(loaded.lookup(key), Some(slot));
        assert_eq!(loaded.key(slot), Some(key));
    }
}

#[test]
fn truncated_index_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tx.kidx");
    save_index(&sample_index(), &path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 9]).unwrap();

    assert!(matches!(
        load_index(&path),
        Err(CountError::InvalidIndex { .. })
    ));
}

#[test]
fn flipped_bit_in_index_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tx.kidx");
    save_index(&sample_index(), &path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[20] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        load_index(&path),
        Err(CountError::InvalidIndex { .. })
    ));
}

#[test]
fn missing_index_is_a_read_error() {
    assert!(matches!(
        load_index("/nonexistent/tx.kidx"),
        Err(CountError::IndexRead { .. })
    ));
}

#[test]
fn counts_align_with_index_slots() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("counts.bin");
    let index = sample_index();
    let reads = vec![Bytes::from_static(b"ACGTACGGTTCA"), Bytes::from_static(b"GGGCCCAAAT")];

    let (expected, _) = count_reads(&index, reads.clone(), 2).unwrap();

    let table = CountTable::new(&index);
    for read in &reads {
        for window in read.windows(5) {
            table.increment(window);
        }
    }
    let summary = table.dump(&path, DumpFormat::Binary).unwrap();

    let file = read_counts(&path).unwrap();
    assert_eq!(file.k, k(5));
    assert_eq!(file.counts(), expected);
    assert_eq!(summary.total, expected.iter().sum::<u64>());
    let keys: Vec<u64> = file.records.iter().map(|&(key, _)| key).collect();
    assert_eq!(keys, index.keys());
}

#[test]
fn tsv_counts_are_readable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("counts.tsv");
    let keys = vec![encode(b"AAC").unwrap(), encode(b"ACG").unwrap()];
    let index = SortedKmerIndex::from_keys(k(3), keys).unwrap();

    let table = CountTable::new(&index);
    table.increment(b"CGT");
    table.increment(b"GTT");
    table.increment(b"acg");
    table.dump(&path, DumpFormat::Tsv).unwrap();

    insta::assert_snapshot!(fs::read_to_string(&path).unwrap().replace('\t', " "), @r"
    #k=3 num_keys=2
    AAC 1
    ACG 2
    ");
}

#[test]
fn json_counts_carry_header_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("counts.json");
    let index = SortedKmerIndex::from_keys(k(2), vec![encode(b"AC").unwrap()]).unwrap();

    let table = CountTable::new(&index);
    table.increment(b"GT");
    table.dump(&path, DumpFormat::Json).unwrap();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["k"], 2);
    assert_eq!(doc["num_keys"], 1);
    assert_eq!(doc["counts"][0]["kmer"], "AC");
    assert_eq!(doc["counts"][0]["count"], 1);
}

#[test]
fn dump_into_missing_directory_fails_cleanly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("counts.bin");
    let index = sample_index();

    let result = CountTable::new(&index).dump(&path, DumpFormat::Binary);

    assert!(matches!(result, Err(CountError::CountsWrite { .. })));
    assert!(!path.exists());
}

#[test]
fn dump_replaces_existing_file_whole() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("counts.bin");
    fs::write(&path, b"stale").unwrap();
    let index = sample_index();

    CountTable::new(&index)
        .dump(&path, DumpFormat::Binary)
        .unwrap();

    let file = read_counts(&path).unwrap();
    assert_eq!(file.records.len(), index.num_keys());
    assert!(file.counts().iter().all(|&c| c == 0));
}
