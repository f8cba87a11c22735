//! Import pipeline
//!
//! One run: scan the drop directory, pick the latest file of each type, then
//! for every selection publish the canonical copy, record it in the encrypted
//! archive (best effort) and move the original into the dated archive.
//! Types are processed independently; a failure on one never stops the other.

pub mod archiver;
pub mod canonical;

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use itertools::Itertools;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::crypto::Passphrase;
use crate::db::{content_hash_known, ArchiveStore, DecodedPayload, ImportItem, InsertOutcome};
use crate::importers::{
    decode_payload, probe_payload_dates, scan_drop_dir, select_all, Selection, SelectionKey,
    SourceKind,
};
pub use archiver::{archive_day_dir, move_into_archive, plan_archive_destination};
pub use canonical::publish_atomic;

/// Per-run inputs that do not come from configuration
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    /// `None` runs in degraded mode: files move but nothing is recorded
    pub passphrase: Option<Passphrase>,
    /// Names the archive subdirectory
    pub today: NaiveDate,
}

impl RunOptions {
    pub fn new(dry_run: bool, passphrase: Option<Passphrase>) -> Self {
        Self {
            dry_run,
            passphrase,
            today: Local::now().date_naive(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    Encrypted,
    /// No passphrase available
    Disabled,
    DryRun,
}

/// What happened in the archive database for one selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreOutcome {
    Inserted {
        file_id: i64,
        valuation_id: Option<i64>,
    },
    Duplicate {
        file_id: i64,
    },
    /// Dry run: content is new and would be recorded
    WouldInsert,
    /// Dry run: content is already on record
    AlreadyStored {
        file_id: i64,
    },
    Skipped,
    Failed {
        error: String,
    },
}

impl From<InsertOutcome> for StoreOutcome {
    fn from(outcome: InsertOutcome) -> Self {
        match outcome {
            InsertOutcome::Inserted {
                file_id,
                valuation_id,
            } => StoreOutcome::Inserted {
                file_id,
                valuation_id,
            },
            InsertOutcome::Duplicate { file_id } => StoreOutcome::Duplicate { file_id },
        }
    }
}

/// Result of processing the selection for one type
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub kind: SourceKind,
    pub selected: String,
    pub source_path: PathBuf,
    pub key: SelectionKey,
    pub content_hash: Option<String>,
    pub canonical_path: PathBuf,
    pub published: bool,
    /// Actual destination, or the planned one in a dry run
    pub archive_path: Option<PathBuf>,
    pub payload_decoded: bool,
    pub store: StoreOutcome,
    pub error: Option<String>,
}

impl SourceOutcome {
    fn new(selection: &Selection, canonical_path: PathBuf) -> Self {
        Self {
            kind: selection.candidate.kind,
            selected: selection.candidate.name.clone(),
            source_path: selection.candidate.path.clone(),
            key: selection.key,
            content_hash: None,
            canonical_path,
            published: false,
            archive_path: None,
            payload_decoded: false,
            store: StoreOutcome::Skipped,
            error: None,
        }
    }

    fn failed(mut self, message: String) -> Self {
        error!("{}: {}", self.selected, message);
        self.error = Some(message);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub dry_run: bool,
    pub store_mode: StoreMode,
    /// Candidate file names per type, as scanned
    pub candidates: BTreeMap<SourceKind, Vec<String>>,
    pub outcomes: Vec<SourceOutcome>,
}

impl ImportReport {
    /// True when any selection failed to publish or archive
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.error.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// BLAKE3 hex digest of file content
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Run one import pass.
///
/// Returns `Err` only for conditions that stop the whole run: an unreadable
/// drop directory or an archive that cannot be opened (wrong passphrase).
/// Per-type failures are reported in [`ImportReport::outcomes`].
pub fn run_import(config: &Config, options: &RunOptions) -> Result<ImportReport> {
    let mut candidates = scan_drop_dir(&config.drop_dir)
        .with_context(|| format!("Cannot scan drop directory {:?}", config.drop_dir))?;
    probe_payload_dates(&mut candidates);

    let grouped: BTreeMap<SourceKind, Vec<String>> = candidates
        .iter()
        .into_group_map_by(|c| c.kind)
        .into_iter()
        .map(|(kind, cands)| (kind, cands.into_iter().map(|c| c.name.clone()).collect()))
        .collect();

    let selections = select_all(&candidates);
    for selection in &selections {
        info!(
            "Latest {}: {} ({:?} {})",
            selection.candidate.kind.label(),
            selection.candidate.name,
            selection.key.basis,
            selection.key.at
        );
    }

    let store_mode = if options.dry_run {
        StoreMode::DryRun
    } else if options.passphrase.is_some() {
        StoreMode::Encrypted
    } else {
        StoreMode::Disabled
    };

    if selections.is_empty() {
        info!("Nothing to import in {:?}", config.drop_dir);
        return Ok(ImportReport {
            dry_run: options.dry_run,
            store_mode,
            candidates: grouped,
            outcomes: Vec::new(),
        });
    }

    // Opened before any file is touched so a wrong passphrase aborts cleanly
    let mut store = match (&options.passphrase, store_mode) {
        (Some(passphrase), StoreMode::Encrypted) => Some(
            ArchiveStore::open(&config.database, passphrase, &config.kdf)
                .context("Cannot open the encrypted archive")?,
        ),
        (None, StoreMode::Disabled) => {
            warn!(
                "No passphrase available (set {}); files will be published and archived but not recorded",
                config.passphrase_env
            );
            None
        }
        _ => None,
    };

    let outcomes = selections
        .iter()
        .map(|selection| {
            if options.dry_run {
                plan_selection(config, options, selection)
            } else {
                process_selection(config, options, selection, store.as_mut())
            }
        })
        .collect();

    Ok(ImportReport {
        dry_run: options.dry_run,
        store_mode,
        candidates: grouped,
        outcomes,
    })
}

/// Decode the payload for storage; parse failures only cost the decoded row.
fn decode_for_store(selection: &Selection, bytes: &[u8]) -> Option<DecodedPayload> {
    if !selection.candidate.kind.decodes_payload() {
        return None;
    }

    let decoded = decode_payload(bytes).and_then(|payload| {
        let as_of = payload
            .max_summary_date
            .unwrap_or(selection.key.at)
            .date();
        Ok(DecodedPayload {
            as_of_date: as_of,
            bytes: payload.to_compact_json()?,
        })
    });

    match decoded {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(
                "{}: {}; storing raw content only",
                selection.candidate.name, e
            );
            None
        }
    }
}

fn process_selection(
    config: &Config,
    options: &RunOptions,
    selection: &Selection,
    store: Option<&mut ArchiveStore>,
) -> SourceOutcome {
    let candidate = &selection.candidate;
    let canonical = config.canonical_output(candidate.kind).to_path_buf();
    let mut outcome = SourceOutcome::new(selection, canonical.clone());

    let bytes = match fs::read(&candidate.path) {
        Ok(bytes) => bytes,
        Err(e) => return outcome.failed(format!("cannot read {:?}: {}", candidate.path, e)),
    };
    let hash = content_hash(&bytes);
    outcome.content_hash = Some(hash.clone());

    let payload = decode_for_store(selection, &bytes);
    outcome.payload_decoded = payload.is_some();

    if let Err(e) = publish_atomic(&bytes, &canonical) {
        return outcome.failed(format!("{:#}", e));
    }
    outcome.published = true;
    info!("Published {} to {:?}", candidate.name, canonical);

    let archive_dest =
        match plan_archive_destination(&candidate.path, &config.archive_dir, options.today) {
            Ok(dest) => dest,
            Err(e) => return outcome.failed(format!("{:#}", e)),
        };

    outcome.store = match store {
        Some(store) => {
            let item = ImportItem {
                kind: candidate.kind,
                original_name: &candidate.name,
                canonical_path: &canonical,
                content_hash: &hash,
                bytes: &bytes,
                modified: candidate.modified.with_timezone(&Utc),
                archive_path: Some(&archive_dest),
                payload,
            };
            match store.insert_import(&item) {
                Ok(inserted) => inserted.into(),
                Err(e) => {
                    warn!("Archive insert for {} failed: {:#}", candidate.name, e);
                    StoreOutcome::Failed {
                        error: format!("{:#}", e),
                    }
                }
            }
        }
        None => StoreOutcome::Skipped,
    };

    if let Err(e) = move_into_archive(&candidate.path, &archive_dest) {
        return outcome.failed(format!("{:#}", e));
    }
    info!("Archived original to {:?}", archive_dest);
    outcome.archive_path = Some(archive_dest);
    outcome
}

/// Dry run: compute what would happen without touching anything.
fn plan_selection(config: &Config, options: &RunOptions, selection: &Selection) -> SourceOutcome {
    let candidate = &selection.candidate;
    let canonical = config.canonical_output(candidate.kind).to_path_buf();
    let mut outcome = SourceOutcome::new(selection, canonical);

    let bytes = match fs::read(&candidate.path) {
        Ok(bytes) => bytes,
        Err(e) => return outcome.failed(format!("cannot read {:?}: {}", candidate.path, e)),
    };
    let hash = content_hash(&bytes);
    outcome.payload_decoded = decode_for_store(selection, &bytes).is_some();

    match plan_archive_destination(&candidate.path, &config.archive_dir, options.today) {
        Ok(dest) => outcome.archive_path = Some(dest),
        Err(e) => return outcome.failed(format!("{:#}", e)),
    }

    outcome.store = match content_hash_known(&config.database, &hash) {
        Ok(Some(file_id)) => StoreOutcome::AlreadyStored { file_id },
        Ok(None) if options.passphrase.is_some() => StoreOutcome::WouldInsert,
        Ok(None) => StoreOutcome::Skipped,
        Err(e) => StoreOutcome::Failed {
            error: format!("{:#}", e),
        },
    };
    outcome.content_hash = Some(hash);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.kdf = KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        };
        fs::create_dir_all(&config.drop_dir).unwrap();
        (dir, config)
    }

    fn options(passphrase: Option<&str>) -> RunOptions {
        RunOptions {
            dry_run: false,
            passphrase: passphrase.and_then(Passphrase::new),
            today: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    fn drop_file(config: &Config, name: &str, content: &str) {
        fs::write(config.drop_dir.join(name), content).unwrap();
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_content_hash_is_blake3_hex() {
        let hash = content_hash(b"");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn test_empty_drop_dir_has_no_side_effects() {
        let (_dir, config) = setup();
        let report = run_import(&config, &options(Some("pw"))).unwrap();

        assert!(report.is_empty());
        assert!(!report.has_failures());
        assert!(!config.database.exists());
        assert!(!config.archive_dir.exists());
    }

    #[test]
    fn test_missing_drop_dir_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = Config::rooted_at(dir.path());
        assert!(run_import(&config, &options(None)).is_err());
    }

    #[test]
    fn test_full_run_publishes_records_and_archives() {
        let (_dir, config) = setup();
        drop_file(&config, "valuations.json", r#"[{"summaryDate":"2024-05-01"}]"#);
        drop_file(&config, "perf.csv", "Monthly,Beginning balance\n");

        let report = run_import(&config, &options(Some("pw"))).unwrap();
        assert_eq!(report.store_mode, StoreMode::Encrypted);
        assert_eq!(report.outcomes.len(), 2);
        assert!(!report.has_failures());

        assert_eq!(
            fs::read_to_string(&config.valuations_output).unwrap(),
            r#"[{"summaryDate":"2024-05-01"}]"#
        );
        assert_eq!(
            fs::read_to_string(&config.performance_output).unwrap(),
            "Monthly,Beginning balance\n"
        );

        let day_dir = archive_day_dir(&config.archive_dir, options(None).today);
        assert_eq!(files_in(&day_dir), vec!["perf.csv", "valuations.json"]);
        assert!(files_in(&config.drop_dir).is_empty());

        let valuations = &report.outcomes[0];
        assert_eq!(valuations.kind, SourceKind::Valuations);
        assert!(valuations.payload_decoded);
        assert!(matches!(
            valuations.store,
            StoreOutcome::Inserted {
                valuation_id: Some(_),
                ..
            }
        ));
        assert!(matches!(
            report.outcomes[1].store,
            StoreOutcome::Inserted {
                valuation_id: None,
                ..
            }
        ));
    }

    #[test]
    fn test_degraded_mode_still_publishes_and_archives() {
        let (_dir, config) = setup();
        drop_file(&config, "perf.csv", "Monthly\n");

        let report = run_import(&config, &options(None)).unwrap();
        assert_eq!(report.store_mode, StoreMode::Disabled);
        assert_eq!(report.outcomes[0].store, StoreOutcome::Skipped);
        assert!(config.performance_output.exists());
        assert!(report.outcomes[0].archive_path.is_some());
        assert!(!config.database.exists());
    }

    #[test]
    fn test_unparseable_valuations_are_still_published() {
        let (_dir, config) = setup();
        drop_file(&config, "broken.json", "{not json");

        let report = run_import(&config, &options(Some("pw"))).unwrap();
        let outcome = &report.outcomes[0];
        assert!(outcome.published);
        assert!(!outcome.payload_decoded);
        assert!(matches!(
            outcome.store,
            StoreOutcome::Inserted {
                valuation_id: None,
                ..
            }
        ));
        assert_eq!(
            fs::read_to_string(&config.valuations_output).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let (_dir, config) = setup();
        drop_file(&config, "valuations.json", "[]");
        let mut opts = options(Some("pw"));
        opts.dry_run = true;

        let report = run_import(&config, &opts).unwrap();
        assert_eq!(report.store_mode, StoreMode::DryRun);
        assert_eq!(report.outcomes[0].store, StoreOutcome::WouldInsert);
        assert!(!report.outcomes[0].published);
        assert!(report.outcomes[0].archive_path.is_some());

        assert_eq!(files_in(&config.drop_dir), vec!["valuations.json"]);
        assert!(!config.valuations_output.exists());
        assert!(!config.archive_dir.exists());
        assert!(!config.database.exists());
    }

    #[test]
    fn test_reimport_is_recorded_as_duplicate() {
        let (_dir, config) = setup();
        drop_file(&config, "perf.csv", "same bytes\n");
        run_import(&config, &options(Some("pw"))).unwrap();

        drop_file(&config, "perf-again.csv", "same bytes\n");
        let report = run_import(&config, &options(Some("pw"))).unwrap();
        assert!(matches!(
            report.outcomes[0].store,
            StoreOutcome::Duplicate { .. }
        ));
    }

    #[test]
    fn test_wrong_passphrase_aborts_before_touching_files() {
        let (_dir, config) = setup();
        drop_file(&config, "first.csv", "one\n");
        run_import(&config, &options(Some("right"))).unwrap();

        drop_file(&config, "second.csv", "two\n");
        assert!(run_import(&config, &options(Some("wrong"))).is_err());
        assert_eq!(files_in(&config.drop_dir), vec!["second.csv"]);
        assert_eq!(
            fs::read_to_string(&config.performance_output).unwrap(),
            "one\n"
        );
    }
}
