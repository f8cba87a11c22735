use std::process::ExitCode;

use anyhow::Result;
use tracing::info;

use crate::cli::formatters::{format_import_report, format_json};
use crate::config::Config;
use crate::crypto::{passphrase_from_env, resolve_passphrase};
use crate::pipeline::{run_import, RunOptions};

pub fn dispatch_import(config: &Config, dry_run: bool, json_output: bool) -> Result<ExitCode> {
    info!("Importing from {:?}", config.drop_dir);

    // A dry run never writes the database, so it never prompts
    let passphrase = if dry_run {
        passphrase_from_env(&config.passphrase_env)
    } else {
        resolve_passphrase(&config.passphrase_env)?
    };

    let report = run_import(config, &RunOptions::new(dry_run, passphrase))?;

    if json_output {
        println!("{}", format_json(&report));
    } else {
        print!("{}", format_import_report(&report, &config.drop_dir));
    }

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
