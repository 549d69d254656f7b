//! Source schemas and canonical column names.
//!
//! Every `(DatasetVersion, MetricKind)` pair maps to one [`SourceSchema`]
//! describing the raw header of the published files and how each raw column
//! becomes a canonical one. Parsing code never branches on version or metric
//! directly; it walks the schema record.

pub mod vocab;

use crate::error::{MobilityError, Result};
use crate::model::{DatasetVersion, MetricKind};
pub use vocab::{Translation, Vocabulary};

// ── Canonical columns ───────────────────────────────────────────────────────
pub mod columns {
    pub const DATE: &str = "date";
    pub const HOUR: &str = "hour";
    pub const ID_ORIGIN: &str = "id_origin";
    pub const ID_DESTINATION: &str = "id_destination";
    pub const ACTIVITY_ORIGIN: &str = "activity_origin";
    pub const ACTIVITY_DESTINATION: &str = "activity_destination";
    pub const INCOME: &str = "income";
    pub const AGE: &str = "age";
    pub const GENDER: &str = "gender";
    pub const N_TRIPS: &str = "n_trips";
    pub const TRIPS_TOTAL_LENGTH_KM: &str = "trips_total_length_km";
    pub const RESIDENCE_AREA: &str = "residence_area";
    pub const OVERNIGHT_STAY_AREA: &str = "overnight_stay_area";
    pub const NUMBER_OF_TRIPS: &str = "number_of_trips";
    pub const PEOPLE: &str = "people";
}

/// How a raw token is turned into a canonical cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `YYYYMMDD` to ISO date string.
    Date,
    /// Two-digit period to integer hour.
    Hour,
    /// Opaque zone identifier, trimmed, float suffix removed.
    ZoneId,
    Category(Vocabulary),
    /// Opaque label, trimmed, float suffix removed (`"2.0"` -> `"2"`).
    Label,
    /// Count or length, run through the numeric normalizer.
    Measure,
}

/// Storage type of a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Number,
}

impl FieldKind {
    pub fn column_type(self) -> ColumnType {
        match self {
            FieldKind::Hour => ColumnType::Integer,
            FieldKind::Measure => ColumnType::Number,
            _ => ColumnType::Text,
        }
    }
}

/// Role of a column in selection and aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Key,
    /// Trip purpose columns, kept only with `keep_activity`.
    Activity,
    /// Socio-demographic columns, kept only with `social_agg`.
    Social,
    Measure,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub column: &'static str,
    /// Raw header names accepted for this column. Empty when the source never
    /// publishes it; the canonical column is then filled with missing values.
    pub raw: &'static [&'static str],
    pub kind: FieldKind,
    pub dimension: Dimension,
}

impl FieldSpec {
    const fn new(
        column: &'static str,
        raw: &'static [&'static str],
        kind: FieldKind,
        dimension: Dimension,
    ) -> Self {
        Self {
            column,
            raw,
            kind,
            dimension,
        }
    }
}

/// Column selection flags shared by the parser and the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnOptions {
    pub keep_activity: bool,
    pub social_agg: bool,
}

#[derive(Debug)]
pub struct SourceSchema {
    pub version: DatasetVersion,
    pub metric: MetricKind,
    /// Header assumed for files published without one.
    pub default_header: &'static [&'static str],
    /// Raw names that must all appear in a first record for it to be a header.
    pub header_tokens: &'static [&'static str],
    /// Canonical output columns, in output order.
    pub fields: &'static [FieldSpec],
}

impl SourceSchema {
    /// Fields retained for the given flags, in canonical order.
    pub fn selected_fields(&self, options: ColumnOptions) -> Vec<&'static FieldSpec> {
        self.fields
            .iter()
            .filter(|f| match f.dimension {
                Dimension::Activity => options.keep_activity,
                Dimension::Social => options.social_agg,
                Dimension::Key | Dimension::Measure => true,
            })
            .collect()
    }

    pub fn column_names(&self, options: ColumnOptions) -> Vec<&'static str> {
        self.selected_fields(options)
            .into_iter()
            .map(|f| f.column)
            .collect()
    }
}

use columns::*;
use Dimension::{Activity, Key, Measure, Social};
use FieldKind::{Category, Date, Hour, Label, ZoneId};

static OD_V2: SourceSchema = SourceSchema {
    version: DatasetVersion::V2,
    metric: MetricKind::OriginDestination,
    default_header: &[
        "fecha",
        "periodo",
        "origen",
        "destino",
        "distancia",
        "actividad_origen",
        "actividad_destino",
        "estudio_origen_posible",
        "estudio_destino_posible",
        "residencia",
        "renta",
        "edad",
        "sexo",
        "viajes",
        "viajes_km",
    ],
    header_tokens: &["fecha", "origen", "destino", "viajes"],
    fields: &[
        FieldSpec::new(DATE, &["fecha"], Date, Key),
        FieldSpec::new(HOUR, &["periodo"], Hour, Key),
        FieldSpec::new(ID_ORIGIN, &["origen"], ZoneId, Key),
        FieldSpec::new(ID_DESTINATION, &["destino"], ZoneId, Key),
        FieldSpec::new(ACTIVITY_ORIGIN, &["actividad_origen"], Category(Vocabulary::Activity), Activity),
        FieldSpec::new(ACTIVITY_DESTINATION, &["actividad_destino"], Category(Vocabulary::Activity), Activity),
        FieldSpec::new(INCOME, &["renta"], Category(Vocabulary::Income), Social),
        FieldSpec::new(AGE, &["edad"], Category(Vocabulary::Age), Social),
        FieldSpec::new(GENDER, &["sexo"], Category(Vocabulary::Gender), Social),
        FieldSpec::new(N_TRIPS, &["viajes"], FieldKind::Measure, Measure),
        FieldSpec::new(TRIPS_TOTAL_LENGTH_KM, &["viajes_km"], FieldKind::Measure, Measure),
    ],
};

static OD_V1: SourceSchema = SourceSchema {
    version: DatasetVersion::V1,
    metric: MetricKind::OriginDestination,
    default_header: &[
        "fecha",
        "origen",
        "destino",
        "actividad_origen",
        "actividad_destino",
        "residencia",
        "edad",
        "periodo",
        "distancia",
        "viajes",
        "viajes_km",
    ],
    header_tokens: &["fecha", "origen", "destino", "viajes"],
    fields: &[
        FieldSpec::new(DATE, &["fecha"], Date, Key),
        FieldSpec::new(HOUR, &["periodo"], Hour, Key),
        FieldSpec::new(ID_ORIGIN, &["origen"], ZoneId, Key),
        FieldSpec::new(ID_DESTINATION, &["destino"], ZoneId, Key),
        FieldSpec::new(ACTIVITY_ORIGIN, &["actividad_origen"], Category(Vocabulary::Activity), Activity),
        FieldSpec::new(ACTIVITY_DESTINATION, &["actividad_destino"], Category(Vocabulary::Activity), Activity),
        FieldSpec::new(INCOME, &[], Category(Vocabulary::Income), Social),
        FieldSpec::new(AGE, &["edad"], Category(Vocabulary::Age), Social),
        FieldSpec::new(GENDER, &[], Category(Vocabulary::Gender), Social),
        FieldSpec::new(N_TRIPS, &["viajes"], FieldKind::Measure, Measure),
        FieldSpec::new(TRIPS_TOTAL_LENGTH_KM, &["viajes_km"], FieldKind::Measure, Measure),
    ],
};

static OVERNIGHT_V2: SourceSchema = SourceSchema {
    version: DatasetVersion::V2,
    metric: MetricKind::OvernightStays,
    default_header: &["fecha", "zona_residencia", "zona_pernoctacion", "personas"],
    header_tokens: &["fecha", "zona_residencia", "zona_pernoctacion"],
    fields: &[
        FieldSpec::new(DATE, &["fecha"], Date, Key),
        FieldSpec::new(RESIDENCE_AREA, &["zona_residencia"], ZoneId, Key),
        FieldSpec::new(OVERNIGHT_STAY_AREA, &["zona_pernoctacion"], ZoneId, Key),
        FieldSpec::new(PEOPLE, &["personas"], FieldKind::Measure, Measure),
    ],
};

static TRIPS_V2: SourceSchema = SourceSchema {
    version: DatasetVersion::V2,
    metric: MetricKind::TripCounts,
    default_header: &["fecha", "zona_pernoctacion", "edad", "sexo", "numero_viajes", "personas"],
    header_tokens: &["fecha", "numero_viajes", "personas"],
    fields: &[
        FieldSpec::new(DATE, &["fecha"], Date, Key),
        FieldSpec::new(OVERNIGHT_STAY_AREA, &["zona_pernoctacion"], ZoneId, Key),
        FieldSpec::new(AGE, &["edad"], Category(Vocabulary::Age), Key),
        FieldSpec::new(GENDER, &["sexo"], Category(Vocabulary::Gender), Key),
        FieldSpec::new(NUMBER_OF_TRIPS, &["numero_viajes"], Label, Key),
        FieldSpec::new(PEOPLE, &["personas"], FieldKind::Measure, Measure),
    ],
};

static TRIPS_V1: SourceSchema = SourceSchema {
    version: DatasetVersion::V1,
    metric: MetricKind::TripCounts,
    default_header: &["fecha", "distrito", "numero_viajes", "personas"],
    header_tokens: &["fecha", "numero_viajes", "personas"],
    fields: &[
        FieldSpec::new(DATE, &["fecha"], Date, Key),
        FieldSpec::new(
            OVERNIGHT_STAY_AREA,
            &["distrito", "municipio", "zona_pernoctacion"],
            ZoneId,
            Key,
        ),
        FieldSpec::new(AGE, &[], Category(Vocabulary::Age), Key),
        FieldSpec::new(GENDER, &[], Category(Vocabulary::Gender), Key),
        FieldSpec::new(NUMBER_OF_TRIPS, &["numero_viajes"], Label, Key),
        FieldSpec::new(PEOPLE, &["personas"], FieldKind::Measure, Measure),
    ],
};

/// Looks up the schema for a version/metric pair. Fails for pairs the
/// publisher never released (overnight stays in v1).
pub fn schema_for(version: DatasetVersion, metric: MetricKind) -> Result<&'static SourceSchema> {
    let schema = match (version, metric) {
        (DatasetVersion::V2, MetricKind::OriginDestination) => &OD_V2,
        (DatasetVersion::V1, MetricKind::OriginDestination) => &OD_V1,
        (DatasetVersion::V2, MetricKind::OvernightStays) => &OVERNIGHT_V2,
        (DatasetVersion::V2, MetricKind::TripCounts) => &TRIPS_V2,
        (DatasetVersion::V1, MetricKind::TripCounts) => &TRIPS_V1,
        (DatasetVersion::V1, MetricKind::OvernightStays) => {
            return Err(MobilityError::UnsupportedMetric {
                metric: metric.to_string(),
                version: version.number(),
            });
        }
    };
    Ok(schema)
}
