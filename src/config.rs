//! Runtime configuration
//!
//! Paths default to the `data/` layout relative to the working directory.
//! An optional `folio.toml` (or an explicit `--config` file) overrides any
//! subset of them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::crypto::{KdfParams, DEFAULT_PASSPHRASE_ENV};
use crate::error::ImportError;
use crate::importers::SourceKind;

pub const DEFAULT_CONFIG_FILE: &str = "folio.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory the operator drops new exports into
    pub drop_dir: PathBuf,
    /// Root of the dated archive subdirectories
    pub archive_dir: PathBuf,
    /// SQLite provenance archive
    pub database: PathBuf,
    pub valuations_output: PathBuf,
    pub performance_output: PathBuf,
    /// Environment variable holding the database passphrase
    pub passphrase_env: String,
    /// Key-derivation cost, used only when a new database is created
    pub kdf: KdfParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drop_dir: PathBuf::from("data/import"),
            archive_dir: PathBuf::from("data/import/archive"),
            database: PathBuf::from("data/localdb.sqlite3"),
            valuations_output: PathBuf::from("data/valuations.json"),
            performance_output: PathBuf::from("data/private/fidelity-performance.csv"),
            passphrase_env: DEFAULT_PASSPHRASE_ENV.to_string(),
            kdf: KdfParams::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `folio.toml` in the working
    /// directory is used when present, otherwise the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ImportError::Config(format!(
                        "config file {:?} does not exist",
                        path
                    ))
                    .into());
                }
                Self::from_file(path)
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)
                } else {
                    debug!("No {} found, using default paths", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ImportError::Config(e.to_string()).into())
    }

    /// Configuration rooted at `root`, using the default relative layout.
    pub fn rooted_at(root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            drop_dir: root.join(&defaults.drop_dir),
            archive_dir: root.join(&defaults.archive_dir),
            database: root.join(&defaults.database),
            valuations_output: root.join(&defaults.valuations_output),
            performance_output: root.join(&defaults.performance_output),
            ..defaults
        }
    }

    /// Canonical destination for a source type.
    pub fn canonical_output(&self, kind: SourceKind) -> &Path {
        match kind {
            SourceKind::Valuations => &self.valuations_output,
            SourceKind::PerformanceExport => &self.performance_output,
        }
    }
}
