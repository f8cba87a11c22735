use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use super::EXIT_NO_PASSPHRASE;
use crate::cli::formatters::{
    format_files_table, format_json, format_valuations_table, format_verify_report,
};
use crate::cli::DbCommands;
use crate::config::Config;
use crate::crypto::{resolve_passphrase, Passphrase};
use crate::db::{self, ArchiveStore};
use crate::pipeline::publish_atomic;

pub fn dispatch_db(config: &Config, action: &DbCommands, json_output: bool) -> Result<ExitCode> {
    match action {
        DbCommands::List => {
            let records = read_metadata(config, db::list_files)?;
            print_records(&records, json_output, format_files_table);
            Ok(ExitCode::SUCCESS)
        }
        DbCommands::Valuations => {
            let records = read_metadata(config, db::list_valuations)?;
            print_records(&records, json_output, format_valuations_table);
            Ok(ExitCode::SUCCESS)
        }
        DbCommands::Init => with_store(config, |store| {
            #[derive(Serialize)]
            struct InitSummary<'a> {
                database: &'a std::path::Path,
                files: usize,
                valuations: usize,
            }

            let summary = InitSummary {
                database: &config.database,
                files: store.list_files()?.len(),
                valuations: store.list_valuations()?.len(),
            };
            if json_output {
                println!("{}", format_json(&summary));
            } else {
                println!(
                    "{} Archive database ready at {} ({} files, {} valuations)",
                    "✓".green().bold(),
                    config.database.display(),
                    summary.files,
                    summary.valuations
                );
            }
            Ok(ExitCode::SUCCESS)
        }),
        DbCommands::Export { id, payload, out } => with_store(config, |store| {
            let bytes = if *payload {
                store.valuation_payload(*id)
            } else {
                store.file_content(*id)
            }
            .with_context(|| format!("Cannot export record {}", id))?;

            match out {
                Some(path) => {
                    publish_atomic(&bytes, path)?;
                    eprintln!(
                        "{} Wrote {} bytes to {}",
                        "✓".green().bold(),
                        bytes.len(),
                        path.display()
                    );
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }),
        DbCommands::Verify => with_store(config, |store| {
            let report = store.verify()?;
            if json_output {
                println!("{}", format_json(&report));
            } else {
                print!("{}", format_verify_report(&report));
            }
            Ok(if report.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }),
    }
}

/// Metadata listings need no key; a missing database simply has no rows.
fn read_metadata<T>(
    config: &Config,
    list: fn(&rusqlite::Connection) -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    if !config.database.is_file() {
        return Ok(Vec::new());
    }
    let conn = db::open_db_read_only(&config.database)?;
    list(&conn).with_context(|| format!("Cannot read {:?}", config.database))
}

fn print_records<T: Serialize>(records: &[T], json_output: bool, table: fn(&[T]) -> String) {
    if json_output {
        println!("{}", format_json(&records));
    } else {
        print!("{}", table(records));
    }
}

fn with_store<F>(config: &Config, run: F) -> Result<ExitCode>
where
    F: FnOnce(&mut ArchiveStore) -> Result<ExitCode>,
{
    let Some(passphrase) = require_passphrase(config)? else {
        return Ok(ExitCode::from(EXIT_NO_PASSPHRASE));
    };
    let mut store = ArchiveStore::open(&config.database, &passphrase, &config.kdf)?;
    run(&mut store)
}

fn require_passphrase(config: &Config) -> Result<Option<Passphrase>> {
    let passphrase = resolve_passphrase(&config.passphrase_env)?;
    if passphrase.is_none() {
        eprintln!(
            "{} No passphrase available: set {} or run from a terminal",
            "✗".red().bold(),
            config.passphrase_env
        );
    }
    Ok(passphrase)
}

