//! SavvyTrader valuations dump decoder
//!
//! The dump is a JSON array of daily entries:
//!
//! ```json
//! [{"summaryDate": "2024-05-01", "dailyTotalValueChange": 0.012, ...}, ...]
//! ```
//!
//! Only the array shape and `summaryDate` matter here; every other field is
//! carried through untouched.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::error::ImportError;

const SUMMARY_DATE_FIELD: &str = "summaryDate";

/// Decoded valuations payload
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationsPayload {
    pub entries: Vec<Value>,
    /// Latest parseable `summaryDate`; `None` when no entry carries one
    pub max_summary_date: Option<NaiveDateTime>,
}

impl ValuationsPayload {
    /// Compact JSON re-serialization, the form stored in the archive
    pub fn to_compact_json(&self) -> Result<Vec<u8>, ImportError> {
        serde_json::to_vec(&self.entries).map_err(|e| ImportError::Parse(e.to_string()))
    }
}

/// Decode a valuations dump.
///
/// Fails only when the bytes are not a JSON array. Non-object entries and
/// entries without a parseable `summaryDate` are kept but do not contribute
/// to `max_summary_date`.
pub fn decode_payload(bytes: &[u8]) -> Result<ValuationsPayload, ImportError> {
    let entries: Vec<Value> = serde_json::from_slice(bytes)
        .map_err(|e| ImportError::Parse(format!("valuations payload: {}", e)))?;

    let max_summary_date = entries
        .iter()
        .filter_map(|entry| entry.get(SUMMARY_DATE_FIELD))
        .filter_map(Value::as_str)
        .filter_map(parse_summary_date)
        .max();

    Ok(ValuationsPayload {
        entries,
        max_summary_date,
    })
}

/// Latest `summaryDate` in the file at `path`, or `None` on any read/parse failure.
pub fn probe_max_summary_date(path: &Path) -> Option<NaiveDateTime> {
    let bytes = std::fs::read(path).ok()?;
    decode_payload(&bytes).ok()?.max_summary_date
}

/// Parse an ISO-8601 date or date-time.
///
/// Offsets are dropped and the wall-clock time kept; date-only values become
/// midnight.
pub fn parse_summary_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
