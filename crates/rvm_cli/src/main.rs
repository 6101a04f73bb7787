//! RVM CLI
//!
//! Command-line tools for RVM directories.
//!
//! # Commands
//!
//! - `inspect` - Show backing segments and commit log statistics
//! - `dump-log` - Dump commit log records for debugging
//! - `checkpoint` - Apply the commit log to every backing file
//! - `destroy` - Remove an unmapped segment's backing file

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RVM command-line tools.
#[derive(Parser)]
#[command(name = "rvm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the RVM directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backing segments and commit log statistics
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Dump commit log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Apply unbacked log records to every backing file and compact the log
    Checkpoint,

    /// Remove a segment's backing file
    Destroy {
        /// Segment name
        name: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("RVM path required for inspect")?;
            commands::inspect::run(&path, format)?;
        }
        Commands::DumpLog { limit, format } => {
            let path = cli.path.ok_or("RVM path required for dump-log")?;
            commands::dump_log::run(&path, limit, format)?;
        }
        Commands::Checkpoint => {
            let path = cli.path.ok_or("RVM path required for checkpoint")?;
            commands::checkpoint::run(&path)?;
        }
        Commands::Destroy { name } => {
            let path = cli.path.ok_or("RVM path required for destroy")?;
            commands::destroy::run(&path, &name, cli.verbose)?;
        }
        Commands::Version => {
            println!("RVM CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("RVM Core v{}", rvm_core::VERSION);
        }
    }

    Ok(())
}
