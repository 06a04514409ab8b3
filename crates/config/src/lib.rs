//! Configuration loading for packrat.
//!
//! Layered lowest-to-highest: built-in defaults, then the user's TOML config
//! file, then `PACKRAT_`-prefixed environment variables. Every field has a
//! sensible default, so a missing config file is a perfectly good one.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `PACKRAT_BLOB_ENDPOINT`.
const ENV_PREFIX: &str = "PACKRAT_";
/// Config file name inside the platform config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Engine configuration, threaded explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the blob store's PUT/GET interface.
    pub blob_endpoint: String,
    /// Path to the metadata authority's SQLite database.
    pub metadata_db: PathBuf,
    /// Author recorded on commits.
    pub author: String,
    /// Conflict policy name for pulls: `backup`, `overwrite` or `skip`.
    pub conflict_policy: String,
    /// Concurrent transfer workers.
    pub transfer_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blob_endpoint: "http://127.0.0.1:9000".to_string(),
            // Falls back to a relative path when no home directory exists;
            // load() replaces it with the platform data dir when it can.
            metadata_db: PathBuf::from("packrat.db"),
            author: "unknown".to_string(),
            conflict_policy: "backup".to_string(),
            transfer_workers: 8,
        }
    }
}

impl Config {
    /// Load from the platform config file (if any) and the environment.
    pub fn load() -> Result<Self> {
        let dirs = project_dirs()?;
        let mut defaults = Self::default();
        defaults.metadata_db = dirs.data_dir().join("metadata.db");
        let file = dirs.config_dir().join(CONFIG_FILE_NAME);
        Self::extract(defaults, &file)
    }

    /// Load from an explicit config file plus the environment. The file may
    /// be absent.
    pub fn load_from(file: impl AsRef<Path>) -> Result<Self> {
        Self::extract(Self::default(), file.as_ref())
    }

    fn extract(defaults: Self, file: &Path) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .or_raise(|| ErrorKind::Invalid)?;
        if config.transfer_workers == 0 {
            exn::bail!(ErrorKind::Invalid);
        }
        tracing::debug!(file = %file.display(), "configuration loaded");
        Ok(config)
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "packrat").ok_or_raise(|| ErrorKind::NoProjectDirs)
}
