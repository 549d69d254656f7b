//! Runtime settings: defaults, an optional JSON file, then environment.
//!
//! ```json
//! {
//!   "data_directory": "/var/cache/mitma",
//!   "output_directory": "results",
//!   "backend": "pandas",
//!   "max_concurrent_downloads": 8,
//!   "download_timeout_secs": 120
//! }
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{MobilityError, Result};
use crate::model::Backend;

pub const DATA_DIR_ENV: &str = "SPAIN_MOBILITY_DATA_DIR";
pub const OUTPUT_DIR_ENV: &str = "SPAIN_MOBILITY_OUTPUT_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Cache of downloaded source files.
    pub data_directory: PathBuf,
    /// Where persisted results are written.
    pub output_directory: PathBuf,
    pub backend: Backend,
    pub max_concurrent_downloads: usize,
    pub download_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("data"),
            output_directory: PathBuf::from("output"),
            backend: Backend::default(),
            max_concurrent_downloads: 4,
            download_timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MobilityError::Config(format!("cannot read settings file {}: {e}", path.display()))
        })?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults, overlaid with `path` when given, then with the environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        Ok(settings.with_env())
    }

    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Applies directory overrides from `lookup`; empty values are ignored.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            debug!(data_directory = %dir, "Data directory from environment");
            self.data_directory = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(OUTPUT_DIR_ENV).filter(|v| !v.is_empty()) {
            debug!(output_directory = %dir, "Output directory from environment");
            self.output_directory = PathBuf::from(dir);
        }
        self
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(MobilityError::Config(
                "max_concurrent_downloads must be at least 1".into(),
            ));
        }
        if self.download_timeout_secs == 0 {
            return Err(MobilityError::Config(
                "download_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
