use std::process;

use clap::Parser;
use colored::Colorize;
use ixcount::{
    cli::{Cli, Command},
    config::{CountConfig, IndexConfig},
    error::CountError,
    run::{run_count, run_index},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.command.quiet());

    if let Err(e) = dispatch(cli.command) {
        eprintln!(
            "{}\n {}",
            "Application error:".blue().bold(),
            e.to_string().blue()
        );
        process::exit(1);
    }
}

fn dispatch(command: Command) -> Result<(), CountError> {
    match command {
        Command::Count(args) => {
            let config = CountConfig::try_from(args)?;
            info!(
                reader = if cfg!(feature = "needletail") {
                    "needletail"
                } else {
                    "rust-bio"
                },
                workers = config.workers,
                "starting count"
            );
            let run = run_count(&config)?;
            info!(
                reads = run.summary.reads,
                counted = run.summary.counted,
                missed = run.summary.missed,
                invalid = run.summary.invalid,
                elapsed_secs = run.elapsed_secs,
                "done"
            );
        }
        Command::Index(args) => {
            let config = IndexConfig::try_from(args)?;
            run_index(&config)?;
        }
    }
    Ok(())
}

/// Logs go to stderr; `RUST_LOG` overrides the default level.
fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
