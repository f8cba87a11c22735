use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::str::FromStr;

/// Lifecycle marker stored with each file record
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Original was moved into the dated archive directory
    Archived,
    /// Recorded without an archive move
    Imported,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Archived => "archived",
            FileStatus::Imported => "imported",
        }
    }
}

impl FromStr for FileStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "archived" => Ok(FileStatus::Archived),
            "imported" => Ok(FileStatus::Imported),
            _ => Err(()),
        }
    }
}

/// Provenance row for one unique file content (metadata only; blobs stay sealed)
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub source: String,
    pub original_name: String,
    pub canonical_path: String,
    pub content_hash: String,
    pub size: i64,
    pub mtime: DateTime<Utc>,
    pub imported_at: DateTime<Utc>,
    pub status: FileStatus,
    pub archive_path: Option<String>,
    pub notes: Option<String>,
    pub encrypted: bool,
}

/// Decoded-payload row for a valuations dump
#[derive(Debug, Clone, Serialize)]
pub struct ValuationRecord {
    pub id: i64,
    pub as_of_date: NaiveDate,
    pub source: String,
    pub file_id: i64,
    pub ingested_at: DateTime<Utc>,
}
