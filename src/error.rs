use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while resolving, parsing and aggregating mobility data.
#[derive(Error, Debug)]
pub enum MobilityError {
    /// Dataset version outside `1` / `2`.
    #[error("Unsupported dataset version: {0}. Version must be 1 or 2")]
    UnsupportedVersion(String),

    #[error("Unknown zones: '{0}'. Use districts, municipalities or large_urban_areas")]
    UnknownZones(String),

    /// Zone granularity not published for this version (large urban areas in v1).
    #[error("{zones} is not a valid zone for version {version}. Please use version 2 or use a different zone")]
    UnsupportedZones { zones: String, version: u8 },

    #[error("Unknown mobility type: '{0}'")]
    UnknownMetric(String),

    /// Metric not published for this version (overnight stays in v1).
    #[error("{metric} data is not available for version {version}")]
    UnsupportedMetric { metric: String, version: u8 },

    #[error("Invalid date '{0}': dates must be in the format YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Date {date} is outside the valid range for version {version} ({first} to {last})")]
    DateOutOfRange {
        date: String,
        version: u8,
        first: String,
        last: String,
    },

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("backend must be either 'arrow' or 'pandas', got '{0}'")]
    UnknownBackend(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download of {url} failed with status {status}")]
    FetchStatus { url: String, status: u16 },

    #[error("Download of {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    /// A source file could not be opened, decompressed or tokenized.
    #[error("Failed to read {path}: {reason}")]
    UnreadableFile { path: PathBuf, reason: String },

    #[error("File {0} contains no records")]
    EmptyFile(PathBuf),

    /// Every requested date was skipped; carries the number of skipped dates.
    #[error("No data could be loaded: all {skipped} requested dates failed")]
    NoData { skipped: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "columnar")]
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MobilityError {
    /// Configuration errors are raised before any I/O and are never
    /// recovered by the pipeline.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MobilityError::UnsupportedVersion(_)
                | MobilityError::UnknownZones(_)
                | MobilityError::UnsupportedZones { .. }
                | MobilityError::UnknownMetric(_)
                | MobilityError::UnsupportedMetric { .. }
                | MobilityError::InvalidDate(_)
                | MobilityError::DateOutOfRange { .. }
                | MobilityError::InvalidDateRange { .. }
                | MobilityError::UnknownBackend(_)
                | MobilityError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MobilityError>;
