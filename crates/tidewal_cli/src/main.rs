//! tidewal CLI
//!
//! Command-line tools for tidewal log directories.
//!
//! # Commands
//!
//! - `inspect` - Display segment and checkpoint layout
//! - `verify` - Read every record and report corruption
//! - `repair` - Cut the log at the first corruption
//! - `checkpoint` - Compact all finished segments into a checkpoint
//! - `truncate` - Delete segments below an index
//! - `dump` - Decode records for debugging
//! - `tail` - Follow the log and print new samples
//!
//! Exit codes: 0 on success, 2 on corruption, 3 on I/O errors, 4 on
//! configuration errors and 1 otherwise.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use error::CliError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// tidewal command-line log tools.
#[derive(Parser)]
#[command(name = "tidewal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the WAL directory
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display segment and checkpoint layout
    Inspect {
        /// Show every segment
        #[arg(short, long)]
        segments: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Read the checkpoint and all segments, reporting corruption
    Verify,

    /// Cut the log at the first corrupt record
    Repair {
        /// Compress records rewritten into the repaired segment
        #[arg(long)]
        compress: bool,
    },

    /// Checkpoint all segments but the one being written
    Checkpoint {
        /// Drop samples and tombstones older than this timestamp (ms)
        #[arg(long, default_value = "0")]
        mint: i64,

        /// Series references to drop
        #[arg(long, value_delimiter = ',')]
        drop_series: Vec<u64>,

        /// Compress the checkpoint
        #[arg(long)]
        compress: bool,
    },

    /// Delete segments with a lower index
    Truncate {
        /// First segment to keep
        #[arg(long)]
        before: u64,
    },

    /// Decode records for debugging
    Dump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Follow the log and print new samples
    Tail {
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let dir = || {
        cli.dir
            .clone()
            .ok_or_else(|| CliError::Usage("WAL directory required (--dir)".into()))
    };

    match cli.command {
        Commands::Inspect { segments, format } => {
            commands::inspect::run(&dir()?, segments, &format)
        }
        Commands::Verify => commands::verify::run(&dir()?),
        Commands::Repair { compress } => commands::repair::run(&dir()?, compress),
        Commands::Checkpoint {
            mint,
            drop_series,
            compress,
        } => commands::checkpoint::run(&dir()?, mint, &drop_series, compress),
        Commands::Truncate { before } => commands::truncate::run(&dir()?, before),
        Commands::Dump { limit, format } => commands::dump::run(&dir()?, limit, &format),
        Commands::Tail { duration_secs } => commands::tail::run(&dir()?, duration_secs),
        Commands::Version => {
            println!("tidewal CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "page size {} bytes, default segment size {} bytes",
                tidewal_core::PAGE_SIZE,
                tidewal_core::DEFAULT_SEGMENT_SIZE
            );
            Ok(())
        }
    }
}
