//! Remote URLs and local cache paths of the daily source files.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{DatasetVersion, MetricKind, Zones};

const V2_BASE_URL: &str = "https://movilidad-opendata.mitma.es/estudios_basicos";
const V1_BASE_URL: &str = "https://opendata-movilidad.mitma.es";

/// One daily file: where it is published and where it is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub date: NaiveDate,
    pub url: String,
    pub local_path: PathBuf,
}

impl SourceFile {
    pub fn resolve(
        version: DatasetVersion,
        zones: Zones,
        metric: MetricKind,
        date: NaiveDate,
        data_dir: &Path,
    ) -> Result<Self> {
        zones.ensure_supported(version)?;
        let metric_name = metric.source_name(version)?;
        let zone_name = zones.source_name(version);
        let month = date.format("%Y-%m");
        let day = date.format("%Y%m%d");

        let (url, extension) = match version {
            DatasetVersion::V2 => {
                let file_metric = if metric == MetricKind::TripCounts {
                    format!("{metric_name}_dia")
                } else {
                    metric_name.to_string()
                };
                let url = format!(
                    "{V2_BASE_URL}/por-{zone_name}/{}/ficheros-diarios/{month}/{day}_{file_metric}_{zone_name}.csv.gz",
                    metric_name.to_lowercase()
                );
                (url, "csv")
            }
            DatasetVersion::V1 => {
                // maestra1 -> maestra_1, distritos -> distrito
                let (stem, number) = metric_name.split_at(metric_name.len() - 1);
                let singular = zone_name.strip_suffix('s').unwrap_or(zone_name);
                let url = format!(
                    "{V1_BASE_URL}/{metric_name}-mitma-{zone_name}/ficheros-diarios/{month}/{day}_{stem}_{number}_mitma_{singular}.txt.gz"
                );
                (url, "txt")
            }
        };

        let local_path = data_dir.join(format!("{day}_{metric_name}_{zone_name}.{extension}.gz"));
        Ok(Self {
            date,
            url,
            local_path,
        })
    }
}

/// Resolves one source per date, in the given order.
pub fn resolve_all(
    version: DatasetVersion,
    zones: Zones,
    metric: MetricKind,
    dates: &[NaiveDate],
    data_dir: &Path,
) -> Result<Vec<SourceFile>> {
    dates
        .iter()
        .map(|d| SourceFile::resolve(version, zones, metric, *d, data_dir))
        .collect()
}

/// File name of a persisted result, e.g. `Viajes_municipios_2022-01-01_2022-01-03_v2.csv`.
pub fn output_file_name(
    version: DatasetVersion,
    zones: Zones,
    metric: MetricKind,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<String> {
    Ok(format!(
        "{}_{}_{}_{}_v{}.csv",
        metric.source_name(version)?,
        zones.source_name(version),
        start,
        end,
        version.number()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_v2_od_source() {
        let src = SourceFile::resolve(
            DatasetVersion::V2,
            Zones::Municipalities,
            MetricKind::OriginDestination,
            day("2022-01-01"),
            Path::new("/data"),
        )
        .unwrap();
        assert_eq!(
            src.url,
            "https://movilidad-opendata.mitma.es/estudios_basicos/por-municipios/viajes/ficheros-diarios/2022-01/20220101_Viajes_municipios.csv.gz"
        );
        assert_eq!(src.local_path, Path::new("/data/20220101_Viajes_municipios.csv.gz"));
    }

    #[test]
    fn test_v2_trip_counts_use_daily_suffix() {
        let src = SourceFile::resolve(
            DatasetVersion::V2,
            Zones::LargeUrbanAreas,
            MetricKind::TripCounts,
            day("2023-03-15"),
            Path::new("cache"),
        )
        .unwrap();
        assert_eq!(
            src.url,
            "https://movilidad-opendata.mitma.es/estudios_basicos/por-GAU/personas/ficheros-diarios/2023-03/20230315_Personas_dia_GAU.csv.gz"
        );
        assert_eq!(src.local_path, Path::new("cache/20230315_Personas_GAU.csv.gz"));
    }

    #[test]
    fn test_v1_source() {
        let src = SourceFile::resolve(
            DatasetVersion::V1,
            Zones::Districts,
            MetricKind::OriginDestination,
            day("2020-03-01"),
            Path::new("cache"),
        )
        .unwrap();
        assert_eq!(
            src.url,
            "https://opendata-movilidad.mitma.es/maestra1-mitma-distritos/ficheros-diarios/2020-03/20200301_maestra_1_mitma_distrito.txt.gz"
        );
        assert_eq!(src.local_path, Path::new("cache/20200301_maestra1_distritos.txt.gz"));
    }

    #[test]
    fn test_unsupported_combinations_fail() {
        let date = day("2020-03-01");
        assert!(SourceFile::resolve(
            DatasetVersion::V1,
            Zones::LargeUrbanAreas,
            MetricKind::OriginDestination,
            date,
            Path::new("."),
        )
        .is_err());
        assert!(SourceFile::resolve(
            DatasetVersion::V1,
            Zones::Districts,
            MetricKind::OvernightStays,
            date,
            Path::new("."),
        )
        .is_err());
    }

    #[test]
    fn test_resolve_all_keeps_date_order() {
        let dates = vec![day("2022-01-02"), day("2022-01-01")];
        let sources = resolve_all(
            DatasetVersion::V2,
            Zones::Districts,
            MetricKind::OvernightStays,
            &dates,
            Path::new("."),
        )
        .unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].date, dates[0]);
        assert!(sources[1].url.ends_with("20220101_Pernoctaciones_distritos.csv.gz"));
    }

    #[test]
    fn test_output_file_name() {
        let name = output_file_name(
            DatasetVersion::V2,
            Zones::Municipalities,
            MetricKind::OriginDestination,
            day("2022-01-01"),
            day("2022-01-03"),
        )
        .unwrap();
        assert_eq!(name, "Viajes_municipios_2022-01-01_2022-01-03_v2.csv");
    }
}
