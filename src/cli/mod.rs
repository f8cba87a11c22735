use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod formatters;

#[derive(Parser)]
#[command(name = "folio")]
#[command(
    version,
    about = "Import the latest portfolio exports from a drop folder"
)]
#[command(
    long_about = "Scan a drop folder for SavvyTrader valuations dumps (.json) and Fidelity performance exports (.csv), publish the latest of each to its canonical path, record it in an encrypted local archive, and move the original into a dated archive directory."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Enable debug logging on stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML config file (default: ./folio.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import the latest file of each type from the drop folder
    Import {
        /// Report what would happen without touching any file or the database
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Encrypted archive database management
    Db {
        #[command(subcommand)]
        action: DbCommands,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Create the archive database and record its key material
    Init,

    /// List archived file records (metadata only)
    List,

    /// List decoded valuation records (metadata only)
    Valuations,

    /// Decrypt an archived file (or its decoded payload)
    Export {
        /// File record id
        id: i64,

        /// Export the decoded valuations payload instead of the raw file
        #[arg(long)]
        payload: bool,

        /// Write to this path instead of stdout
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Authenticate every encrypted blob in the archive
    Verify,
}
