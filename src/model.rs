//! Configuration enums for dataset version, zone granularity, metric and
//! parsing backend, with the alias normalization accepted on the CLI and in
//! settings files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MobilityError, Result};

/// Release of the MITMA open mobility study.
///
/// `V1` covers the COVID-19 period (2020–2021, `.txt.gz` files), `V2` the
/// "estudios básicos" published from 2022 onwards (`.csv.gz` files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetVersion {
    V1,
    V2,
}

impl DatasetVersion {
    pub fn number(self) -> u8 {
        match self {
            DatasetVersion::V1 => 1,
            DatasetVersion::V2 => 2,
        }
    }

    pub fn from_number(n: u8) -> Result<Self> {
        match n {
            1 => Ok(DatasetVersion::V1),
            2 => Ok(DatasetVersion::V2),
            other => Err(MobilityError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl FromStr for DatasetVersion {
    type Err = MobilityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches(['v', 'V']) {
            "1" => Ok(DatasetVersion::V1),
            "2" => Ok(DatasetVersion::V2),
            _ => Err(MobilityError::UnsupportedVersion(s.to_string())),
        }
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Spatial granularity of the MITMA zoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zones {
    Districts,
    Municipalities,
    LargeUrbanAreas,
}

impl Zones {
    /// Name used by the publisher in paths and file names.
    pub fn source_name(self, version: DatasetVersion) -> &'static str {
        match (self, version) {
            (Zones::Districts, _) => "distritos",
            (Zones::Municipalities, _) => "municipios",
            (Zones::LargeUrbanAreas, DatasetVersion::V2) => "GAU",
            (Zones::LargeUrbanAreas, DatasetVersion::V1) => "gaus",
        }
    }

    /// Fails fast for granularities not published for `version`.
    pub fn ensure_supported(self, version: DatasetVersion) -> Result<()> {
        if self == Zones::LargeUrbanAreas && version == DatasetVersion::V1 {
            return Err(MobilityError::UnsupportedZones {
                zones: "gaus".to_string(),
                version: version.number(),
            });
        }
        Ok(())
    }
}

impl FromStr for Zones {
    type Err = MobilityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "districts" | "dist" | "distr" | "distritos" => Ok(Zones::Districts),
            "municipalities" | "muni" | "municipal" | "municipios" => Ok(Zones::Municipalities),
            "lua" | "large_urban_areas" | "gau" | "gaus" | "grandes_areas_urbanas" => {
                Ok(Zones::LargeUrbanAreas)
            }
            _ => Err(MobilityError::UnknownZones(s.to_string())),
        }
    }
}

impl fmt::Display for Zones {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Zones::Districts => "districts",
            Zones::Municipalities => "municipalities",
            Zones::LargeUrbanAreas => "large_urban_areas",
        };
        f.write_str(name)
    }
}

/// Which mobility table is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    OriginDestination,
    OvernightStays,
    TripCounts,
}

impl MetricKind {
    /// Publisher's name for the metric: `Viajes` / `Pernoctaciones` /
    /// `Personas` in v2, `maestra1` / `maestra2` in v1.
    pub fn source_name(self, version: DatasetVersion) -> Result<&'static str> {
        match (self, version) {
            (MetricKind::OriginDestination, DatasetVersion::V2) => Ok("Viajes"),
            (MetricKind::OvernightStays, DatasetVersion::V2) => Ok("Pernoctaciones"),
            (MetricKind::TripCounts, DatasetVersion::V2) => Ok("Personas"),
            (MetricKind::OriginDestination, DatasetVersion::V1) => Ok("maestra1"),
            (MetricKind::TripCounts, DatasetVersion::V1) => Ok("maestra2"),
            (MetricKind::OvernightStays, DatasetVersion::V1) => Err(self.unsupported(version)),
        }
    }

    pub fn ensure_supported(self, version: DatasetVersion) -> Result<()> {
        self.source_name(version).map(|_| ())
    }

    fn unsupported(self, version: DatasetVersion) -> MobilityError {
        MobilityError::UnsupportedMetric {
            metric: self.to_string(),
            version: version.number(),
        }
    }
}

impl FromStr for MetricKind {
    type Err = MobilityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "od" | "origin-destination" | "origin_destination" | "viajes" | "maestra1" => {
                Ok(MetricKind::OriginDestination)
            }
            "os" | "overnight_stays" | "overnight-stays" | "pernoctaciones" => {
                Ok(MetricKind::OvernightStays)
            }
            "nt" | "number_of_trips" | "number-of-trips" | "trips" | "personas" | "maestra2" => {
                Ok(MetricKind::TripCounts)
            }
            _ => Err(MobilityError::UnknownMetric(s.to_string())),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::OriginDestination => "Origin-destination",
            MetricKind::OvernightStays => "Overnight stays",
            MetricKind::TripCounts => "Number of trips",
        };
        f.write_str(name)
    }
}

/// Parsing backend requested by the caller. Resolved into an
/// [`Engine`](crate::engine::Engine) by [`crate::engine::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Arrow,
    Pandas,
}

impl FromStr for Backend {
    type Err = MobilityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "arrow" => Ok(Backend::Arrow),
            "pandas" => Ok(Backend::Pandas),
            _ => Err(MobilityError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Arrow => f.write_str("arrow"),
            Backend::Pandas => f.write_str("pandas"),
        }
    }
}
