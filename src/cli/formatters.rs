//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of running an import from presenting it.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::db::{FileRecord, ValuationRecord, VerifyReport};
use crate::importers::KeyBasis;
use crate::pipeline::{ImportReport, StoreMode, StoreOutcome};
use crate::utils::{format_bytes, format_local, short_hash};

/// Pretty JSON for any serializable result
pub fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

fn store_cell(store: &StoreOutcome) -> String {
    match store {
        StoreOutcome::Inserted {
            file_id,
            valuation_id: Some(v),
        } => format!("file #{} + valuation #{}", file_id, v)
            .green()
            .to_string(),
        StoreOutcome::Inserted { file_id, .. } => format!("file #{}", file_id).green().to_string(),
        StoreOutcome::Duplicate { file_id } => {
            format!("duplicate of #{}", file_id).yellow().to_string()
        }
        StoreOutcome::WouldInsert => "would insert".cyan().to_string(),
        StoreOutcome::AlreadyStored { file_id } => {
            format!("already stored (#{})", file_id).yellow().to_string()
        }
        StoreOutcome::Skipped => "skipped".bright_black().to_string(),
        StoreOutcome::Failed { .. } => "failed".red().to_string(),
    }
}

fn path_cell(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Terminal summary of one import run
pub fn format_import_report(report: &ImportReport, drop_dir: &Path) -> String {
    let mut output = String::new();

    if report.is_empty() {
        output.push_str(&format!(
            "{} No importable files in {}\n",
            "ℹ".blue().bold(),
            drop_dir.display()
        ));
        return output;
    }

    let heading = if report.dry_run {
        "Dry run, nothing was changed"
    } else {
        "Import complete"
    };
    let glyph = if report.has_failures() {
        "✗".red().bold()
    } else {
        "✓".green().bold()
    };
    output.push_str(&format!("\n{} {}\n\n", glyph, heading));

    #[derive(Tabled)]
    struct OutcomeRow {
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Selected")]
        selected: String,
        #[tabled(rename = "Ordered by")]
        key: String,
        #[tabled(rename = "Candidates")]
        candidates: usize,
        #[tabled(rename = "Canonical")]
        canonical: String,
        #[tabled(rename = "Archive")]
        archive: String,
        #[tabled(rename = "Database")]
        store: String,
    }

    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|o| {
            let basis = match o.key.basis {
                KeyBasis::PayloadDate => "summaryDate",
                KeyBasis::ModifiedTime => "mtime",
            };
            let canonical = if o.published || report.dry_run {
                o.canonical_path.display().to_string()
            } else {
                "not published".red().to_string()
            };
            OutcomeRow {
                kind: o.kind.label().to_string(),
                selected: o.selected.clone(),
                key: format!("{} {}", basis, o.key.at.format("%Y-%m-%d %H:%M")),
                candidates: report.candidates.get(&o.kind).map_or(0, Vec::len),
                canonical,
                archive: path_cell(o.archive_path.as_deref()),
                store: store_cell(&o.store),
            }
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    table.modify(Columns::new(3..4), Alignment::right());
    output.push_str(&table.to_string());
    output.push('\n');

    if report.store_mode == StoreMode::Disabled {
        output.push_str(&format!(
            "\n{} No passphrase: files were not recorded in the encrypted archive\n",
            "⚠".yellow().bold()
        ));
    }

    for o in &report.outcomes {
        if let Some(err) = &o.error {
            output.push_str(&format!("{} {}: {}\n", "✗".red().bold(), o.selected, err));
        }
        if let StoreOutcome::Failed { error } = &o.store {
            output.push_str(&format!(
                "{} {}: archive insert failed: {}\n",
                "⚠".yellow().bold(),
                o.selected,
                error
            ));
        }
    }

    output
}

/// Archived file records as a table
pub fn format_files_table(records: &[FileRecord]) -> String {
    if records.is_empty() {
        return format!("{} No archived files yet\n", "ℹ".blue().bold());
    }

    #[derive(Tabled)]
    struct FileRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Source")]
        source: String,
        #[tabled(rename = "Original name")]
        original_name: String,
        #[tabled(rename = "Size")]
        size: String,
        #[tabled(rename = "Hash")]
        hash: String,
        #[tabled(rename = "Imported")]
        imported_at: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Archive path")]
        archive_path: String,
    }

    let rows: Vec<FileRow> = records
        .iter()
        .map(|r| FileRow {
            id: r.id,
            source: r.source.clone(),
            original_name: r.original_name.clone(),
            size: format_bytes(r.size.max(0) as u64),
            hash: short_hash(&r.content_hash).to_string(),
            imported_at: format_local(&r.imported_at),
            status: r.status.as_str().to_string(),
            archive_path: r.archive_path.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    table.modify(Columns::new(3..4), Alignment::right());
    format!("{}\n", table)
}

/// Valuation records as a table
pub fn format_valuations_table(records: &[ValuationRecord]) -> String {
    if records.is_empty() {
        return format!("{} No valuation records yet\n", "ℹ".blue().bold());
    }

    #[derive(Tabled)]
    struct ValuationRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "As of")]
        as_of_date: String,
        #[tabled(rename = "Source")]
        source: String,
        #[tabled(rename = "File")]
        file_id: i64,
        #[tabled(rename = "Ingested")]
        ingested_at: String,
    }

    let rows: Vec<ValuationRow> = records
        .iter()
        .map(|r| ValuationRow {
            id: r.id,
            as_of_date: r.as_of_date.format("%Y-%m-%d").to_string(),
            source: r.source.clone(),
            file_id: r.file_id,
            ingested_at: format_local(&r.ingested_at),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    format!("{}\n", table)
}

pub fn format_verify_report(report: &VerifyReport) -> String {
    if report.is_ok() {
        return format!(
            "{} {} encrypted blobs authenticated\n",
            "✓".green().bold(),
            report.checked
        );
    }

    let mut output = format!(
        "{} {} of {} encrypted blobs failed authentication\n",
        "✗".red().bold(),
        report.failures.len(),
        report.checked
    );
    for failure in &report.failures {
        output.push_str(&format!(
            "  {} #{}: {}\n",
            failure.table, failure.id, failure.error
        ));
    }
    output
}
