// Import module - drop-folder scanning, payload decoding and latest-file selection

mod file_detector;
pub mod scanner;
pub mod selector;
pub mod valuations;

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

pub use file_detector::detect_source_kind;
pub use scanner::{scan_drop_dir, PARTIAL_SUFFIXES};
pub use selector::{select_all, select_latest, selection_key, KeyBasis, Selection, SelectionKey};
pub use valuations::{decode_payload, probe_max_summary_date, ValuationsPayload};

/// Supported export types, told apart by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SourceKind {
    /// SavvyTrader valuations dump (`.json`)
    #[serde(rename = "savvytrader")]
    Valuations,
    /// Fidelity performance export (`.csv`)
    #[serde(rename = "fidelity")]
    PerformanceExport,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Valuations, SourceKind::PerformanceExport];

    /// Source tag persisted in the archive database
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Valuations => "savvytrader",
            SourceKind::PerformanceExport => "fidelity",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Valuations => "SavvyTrader",
            SourceKind::PerformanceExport => "Fidelity",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SourceKind::Valuations => "json",
            SourceKind::PerformanceExport => "csv",
        }
    }

    /// Whether files of this type carry a payload worth decoding and storing
    pub fn decodes_payload(&self) -> bool {
        matches!(self, SourceKind::Valuations)
    }
}

impl FromStr for SourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "savvytrader" | "valuations" => Ok(SourceKind::Valuations),
            "fidelity" | "performance" => Ok(SourceKind::PerformanceExport),
            _ => Err(()),
        }
    }
}

/// A file in the drop directory that passed the scanner's filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Modification time with the local UTC offset in effect at that instant
    pub modified: DateTime<FixedOffset>,
    pub kind: SourceKind,
    /// Latest `summaryDate` in the payload, filled in by [`probe_payload_dates`]
    pub payload_date: Option<NaiveDateTime>,
}

/// Read valuations candidates and record their latest payload date.
///
/// Files that fail to parse keep `payload_date = None` and are later ordered
/// by modification time.
pub fn probe_payload_dates(candidates: &mut [Candidate]) {
    for candidate in candidates
        .iter_mut()
        .filter(|c| c.kind.decodes_payload())
    {
        candidate.payload_date = probe_max_summary_date(&candidate.path);
        match candidate.payload_date {
            Some(date) => debug!("{}: latest summaryDate {}", candidate.name, date),
            None => debug!(
                "{}: no usable summaryDate, falling back to mtime",
                candidate.name
            ),
        }
    }
}
