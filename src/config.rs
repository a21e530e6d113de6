//! Validated settings for each subcommand.
//!
//! Everything a run needs is checked here, before the index is loaded or any
//! thread is started: input files must exist, output directories must exist,
//! and worker counts must be at least one.

use std::{
    fs,
    path::{Path, PathBuf},
};

use colored::Colorize;

use crate::{
    cli::{CountArgs, IndexArgs},
    counts::DumpFormat,
    error::CountError,
    kmer::KmerLength,
};

/// Settings for `ixcount count`.
#[derive(Debug, Clone)]
pub struct CountConfig {
    pub index: PathBuf,
    pub reads: Vec<PathBuf>,
    pub counts: PathBuf,
    pub workers: usize,
    pub format: DumpFormat,
    pub report_interval: u64,
    pub stats: Option<PathBuf>,
}

impl TryFrom<CountArgs> for CountConfig {
    type Error = CountError;

    fn try_from(args: CountArgs) -> Result<Self, Self::Error> {
        if args.threads == 0 {
            return Err(CountError::config("at least one worker thread is required"));
        }
        if args.reads.is_empty() {
            return Err(CountError::config("at least one read file is required"));
        }

        check_input(&args.index)?;
        for path in &args.reads {
            check_input(path)?;
        }
        check_output(&args.counts)?;
        if let Some(stats) = &args.stats {
            check_output(stats)?;
        }

        Ok(Self {
            index: args.index,
            reads: args.reads,
            counts: args.counts,
            workers: args.threads,
            format: args.format,
            report_interval: args.report_every,
            stats: args.stats,
        })
    }
}

/// Settings for `ixcount index`.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub transcripts: PathBuf,
    pub k: KmerLength,
    pub output: PathBuf,
    pub threads: Option<usize>,
}

impl TryFrom<IndexArgs> for IndexConfig {
    type Error = CountError;

    fn try_from(args: IndexArgs) -> Result<Self, Self::Error> {
        let k = KmerLength::new(args.k)?;
        if args.threads == Some(0) {
            return Err(CountError::config("at least one thread is required"));
        }
        check_input(&args.transcripts)?;
        check_output(&args.output)?;

        Ok(Self {
            transcripts: args.transcripts,
            k,
            output: args.output,
            threads: args.threads,
        })
    }
}

/// `-` (stdin) is always accepted.
fn check_input(path: &Path) -> Result<(), CountError> {
    if path.as_os_str() == "-" {
        return Ok(());
    }
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(CountError::config(format!(
            "{} is not a file",
            path.display().to_string().bold()
        ))),
        Err(e) => Err(CountError::config(format!(
            "issue with file path {}: {e}",
            path.display().to_string().bold()
        ))),
    }
}

fn check_output(path: &Path) -> Result<(), CountError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };
    if parent.is_dir() {
        Ok(())
    } else {
        Err(CountError::config(format!(
            "output directory {} does not exist",
            parent.display().to_string().bold()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    fn count_args(index: &Path, reads: &Path, counts: PathBuf) -> CountArgs {
        CountArgs {
            index: index.to_path_buf(),
            reads: vec![reads.to_path_buf()],
            counts,
            threads: 4,
            format: DumpFormat::Tsv,
            report_every: 10,
            stats: None,
            quiet: false,
        }
    }

    #[test]
    fn valid_count_config() {
        let index = NamedTempFile::new().unwrap();
        let reads = NamedTempFile::new().unwrap();
        let dir = tempdir().unwrap();

        let config =
            CountConfig::try_from(count_args(index.path(), reads.path(), dir.path().join("out")))
                .unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.report_interval, 10);
        assert_eq!(config.format, DumpFormat::Tsv);
    }

    #[test]
    fn stdin_reads_are_accepted() {
        let index = NamedTempFile::new().unwrap();
        let dir = tempdir().unwrap();
        let args = count_args(index.path(), Path::new("-"), dir.path().join("out"));
        assert!(CountConfig::try_from(args).is_ok());
    }

    #[test]
    fn zero_threads_rejected() {
        let index = NamedTempFile::new().unwrap();
        let reads = NamedTempFile::new().unwrap();
        let mut args = count_args(index.path(), reads.path(), PathBuf::from("out"));
        args.threads = 0;
        assert!(matches!(
            CountConfig::try_from(args),
            Err(CountError::Config { .. })
        ));
    }

    #[test]
    fn missing_index_rejected() {
        let reads = NamedTempFile::new().unwrap();
        let args = count_args(
            Path::new("/nonexistent/index.bin"),
            reads.path(),
            PathBuf::from("out"),
        );
        assert!(matches!(
            CountConfig::try_from(args),
            Err(CountError::Config { .. })
        ));
    }

    #[test]
    fn missing_output_directory_rejected() {
        let index = NamedTempFile::new().unwrap();
        let reads = NamedTempFile::new().unwrap();
        let args = count_args(
            index.path(),
            reads.path(),
            PathBuf::from("/nonexistent/dir/counts.bin"),
        );
        assert!(CountConfig::try_from(args).is_err());
    }

    #[test]
    fn index_config_validates_k() {
        let transcripts = NamedTempFile::new().unwrap();
        let args = IndexArgs {
            transcripts: transcripts.path().to_path_buf(),
            k: 40,
            output: PathBuf::from("idx.bin"),
            threads: None,
            quiet: false,
        };
        assert!(matches!(
            IndexConfig::try_from(args),
            Err(CountError::InvalidKmerLength { k: 40, .. })
        ));
    }
}
