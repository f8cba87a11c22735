use anyhow::{anyhow, Result};
use std::path::Path;

use super::SourceKind;

/// Detect the export type of a drop-folder file from its extension
///
/// Detection strategy:
/// - `.json` → SavvyTrader valuations dump
/// - `.csv`  → Fidelity performance export
/// - anything else → error (the scanner skips such files)
///
/// Matching is case-insensitive, so `Export.CSV` counts.
pub fn detect_source_kind<P: AsRef<Path>>(path: P) -> Result<SourceKind> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("File has no extension"))?
        .to_lowercase();

    SourceKind::ALL
        .into_iter()
        .find(|kind| kind.extension() == extension)
        .ok_or_else(|| {
            anyhow!(
                "Unsupported file extension: {}. Supported formats: .json, .csv",
                extension
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_by_extension_case_insensitively() {
        assert_eq!(
            detect_source_kind("valuations.json").unwrap(),
            SourceKind::Valuations
        );
        assert_eq!(
            detect_source_kind("Report.CSV").unwrap(),
            SourceKind::PerformanceExport
        );
    }

    #[test]
    fn test_rejects_unknown_and_missing_extensions() {
        assert!(detect_source_kind("notes.txt")
            .unwrap_err()
            .to_string()
            .contains("Unsupported"));
        assert!(detect_source_kind("README").is_err());
    }
}
