//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::{
    counts::DumpFormat,
    dispatch::{DEFAULT_REPORT_INTERVAL, DEFAULT_WORKERS},
    kmer::KmerLength,
};

/// Parallel counting of read k-mers against a fixed k-mer index.
#[derive(Parser, Debug)]
#[command(name = "ixcount")]
#[command(version, author, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Count the k-mers of sequencing reads into the slots of an index
    Count(CountArgs),
    /// Build a k-mer index from transcript sequences
    Index(IndexArgs),
}

#[derive(Args, Debug)]
pub struct CountArgs {
    /// Path to the k-mer index
    #[arg(short, long)]
    pub index: PathBuf,

    /// FASTA/FASTQ read files (`-` for stdin)
    #[arg(short, long, required = true, num_args = 1..)]
    pub reads: Vec<PathBuf>,

    /// Where to write the counts
    #[arg(short, long)]
    pub counts: PathBuf,

    /// Number of worker threads
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub threads: usize,

    /// Counts file format
    #[arg(short, long, value_enum, default_value_t = DumpFormat::Binary)]
    pub format: DumpFormat,

    /// Reads between progress reports (0 disables them)
    #[arg(long, default_value_t = DEFAULT_REPORT_INTERVAL)]
    pub report_every: u64,

    /// Write a JSON run summary to this path
    #[arg(long)]
    pub stats: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// FASTA file of transcript sequences
    #[arg(short, long)]
    pub transcripts: PathBuf,

    /// K-mer length (1-32)
    #[arg(short, value_parser = parse_k)]
    pub k: usize,

    /// Where to write the index
    #[arg(short, long)]
    pub output: PathBuf,

    /// Number of threads used to build the index (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Command {
    pub const fn quiet(&self) -> bool {
        match self {
            Self::Count(args) => args.quiet,
            Self::Index(args) => args.quiet,
        }
    }
}

fn parse_k(s: &str) -> Result<usize, String> {
    let k: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    KmerLength::new(k).map_err(|e| e.to_string())?;
    Ok(k)
}
