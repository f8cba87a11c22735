//! Drop-directory scanner.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::debug;

use super::{detect_source_kind, Candidate};
use crate::error::ImportError;

/// Suffixes browsers and download managers use for incomplete transfers
pub const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".download", ".part", ".partial", ".tmp"];

/// List importable files directly under `dir`.
///
/// Skips hidden files, partial downloads, zero-byte files, anything that is
/// not a regular file (following symlinks), and unsupported extensions.
/// A missing or unreadable directory is a configuration error.
pub fn scan_drop_dir(dir: &Path) -> Result<Vec<Candidate>> {
    let drop_dir_error = |source| ImportError::DropDir {
        path: dir.to_path_buf(),
        source,
    };
    let entries = fs::read_dir(dir).map_err(drop_dir_error)?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(drop_dir_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if let Some(reason) = exclusion_reason(&name) {
            debug!("Skipping {} ({})", name, reason);
            continue;
        }

        let path = entry.path();
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping {} ({})", name, e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        if metadata.len() == 0 {
            debug!("Skipping {} (empty file)", name);
            continue;
        }

        let kind = match detect_source_kind(&path) {
            Ok(kind) => kind,
            Err(e) => {
                debug!("Skipping {} ({})", name, e);
                continue;
            }
        };

        let modified: DateTime<Local> = metadata
            .modified()
            .with_context(|| format!("Failed to read modification time of {:?}", path))?
            .into();

        candidates.push(Candidate {
            path,
            name,
            size: metadata.len(),
            modified: modified.fixed_offset(),
            kind,
            payload_date: None,
        });
    }

    candidates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(candidates)
}

fn exclusion_reason(name: &str) -> Option<&'static str> {
    if name.starts_with('.') {
        return Some("hidden");
    }
    let lower = name.to_ascii_lowercase();
    if PARTIAL_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return Some("partial download");
    }
    None
}
