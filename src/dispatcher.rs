//! Command dispatcher that routes parsed clap commands to their handlers.
//!
//! Handlers print their own output and return the process exit status;
//! errors bubbling out of here are reported by `main` with exit status 1.

mod db;
mod imports;

use std::process::ExitCode;

use anyhow::Result;
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::config::Config;

/// Exit status for `db` commands that need a passphrase and have none
pub const EXIT_NO_PASSPHRASE: u8 = 2;

/// Route a parsed command to its handler
pub fn dispatch_command(cli: &Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())?;
    debug!("Effective config: {:?}", config);

    match &cli.command {
        Commands::Import { dry_run } => imports::dispatch_import(&config, *dry_run, cli.json),
        Commands::Db { action } => db::dispatch_db(&config, action, cli.json),
    }
}
