//! Download, parse and aggregate a date range of one metric.
//!
//! [`MobilityPipeline`] validates its configuration up front, then for each
//! run fetches the daily files concurrently, parses them in date order,
//! concatenates and aggregates the result and either returns it or hands it
//! to a [`TableWriter`]. Dates that fail to download or parse are skipped
//! and reported; the run only fails when no date succeeds.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{Instrument, info, warn};

use crate::aggregate::aggregate_canonical;
use crate::config::Settings;
use crate::dates::{date_range, ensure_within_window, parse_date};
use crate::engine::{self, Selection};
use crate::error::{MobilityError, Result};
use crate::fetch::{BasicClient, Fetcher, HttpFetcher};
use crate::model::{Backend, DatasetVersion, MetricKind, Zones};
use crate::output::{CsvTableWriter, TableWriter};
use crate::parser::{self, ParseStats};
use crate::schema::{ColumnOptions, schema_for};
use crate::sources::{self, SourceFile};
use crate::table::CanonicalTable;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub version: DatasetVersion,
    pub zones: Zones,
    /// First date, `YYYY-MM-DD`.
    pub start_date: String,
    /// Last date, inclusive. Defaults to `start_date`.
    pub end_date: Option<String>,
    pub data_directory: PathBuf,
    pub output_directory: PathBuf,
    pub backend: Backend,
    pub max_concurrent_downloads: usize,
    pub download_timeout: Duration,
}

impl PipelineConfig {
    /// Single-day configuration with default settings.
    pub fn new(version: DatasetVersion, zones: Zones, start_date: impl Into<String>) -> Self {
        Self::from_settings(&Settings::default(), version, zones, start_date, None)
    }

    pub fn from_settings(
        settings: &Settings,
        version: DatasetVersion,
        zones: Zones,
        start_date: impl Into<String>,
        end_date: Option<String>,
    ) -> Self {
        Self {
            version,
            zones,
            start_date: start_date.into(),
            end_date,
            data_directory: settings.data_directory.clone(),
            output_directory: settings.output_directory.clone(),
            backend: settings.backend,
            max_concurrent_downloads: settings.max_concurrent_downloads,
            download_timeout: settings.download_timeout(),
        }
    }
}

/// Per-run flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Keep trip purpose columns (origin-destination only).
    pub keep_activity: bool,
    /// Keep income, age and gender columns (origin-destination only).
    pub social_agg: bool,
    /// Return the table instead of persisting it.
    pub return_table: bool,
}

impl RunOptions {
    fn column_options(self) -> ColumnOptions {
        ColumnOptions {
            keep_activity: self.keep_activity,
            social_agg: self.social_agg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Download,
    Parse,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateFailure {
    pub date: NaiveDate,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDate {
    pub date: NaiveDate,
    pub rows: usize,
    pub stats: ParseStats,
}

/// What happened to each requested date.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub processed: Vec<ProcessedDate>,
    pub failures: Vec<DateFailure>,
}

impl RunReport {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }
}

#[derive(Debug)]
pub enum Delivery {
    Returned(CanonicalTable),
    Persisted(PathBuf),
}

#[derive(Debug)]
pub struct RunOutcome {
    pub delivery: Delivery,
    pub report: RunReport,
}

impl RunOutcome {
    pub fn table(&self) -> Option<&CanonicalTable> {
        match &self.delivery {
            Delivery::Returned(table) => Some(table),
            Delivery::Persisted(_) => None,
        }
    }

    pub fn into_table(self) -> Option<CanonicalTable> {
        match self.delivery {
            Delivery::Returned(table) => Some(table),
            Delivery::Persisted(_) => None,
        }
    }

    pub fn persisted_path(&self) -> Option<&PathBuf> {
        match &self.delivery {
            Delivery::Persisted(path) => Some(path),
            Delivery::Returned(_) => None,
        }
    }
}

pub struct MobilityPipeline {
    config: PipelineConfig,
    start: NaiveDate,
    end: NaiveDate,
    dates: Vec<NaiveDate>,
    selection: Selection,
    fetcher: Arc<dyn Fetcher>,
    writer: Arc<dyn TableWriter>,
}

impl MobilityPipeline {
    /// Pipeline downloading over HTTP and persisting CSV files.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let client = BasicClient::with_timeout(config.download_timeout)?;
        Self::with_collaborators(
            config,
            Arc::new(HttpFetcher::with_client(client)),
            Arc::new(CsvTableWriter),
        )
    }

    /// Validates `config` and wires in the given fetcher and writer.
    pub fn with_collaborators(
        config: PipelineConfig,
        fetcher: Arc<dyn Fetcher>,
        writer: Arc<dyn TableWriter>,
    ) -> Result<Self> {
        config.zones.ensure_supported(config.version)?;
        if config.max_concurrent_downloads == 0 {
            return Err(MobilityError::Config(
                "max_concurrent_downloads must be at least 1".into(),
            ));
        }

        let start = parse_date(&config.start_date)?;
        let end = match &config.end_date {
            Some(end) => parse_date(end)?,
            None => start,
        };
        let dates = date_range(start, end)?;
        ensure_within_window(start, config.version)?;
        ensure_within_window(end, config.version)?;

        let selection = engine::select(config.backend);

        Ok(Self {
            config,
            start,
            end,
            dates,
            selection,
            fetcher,
            writer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Engine chosen for this pipeline, with the fallback advisory if any.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Origin-destination trips between zones.
    pub async fn get_od_data(
        &self,
        keep_activity: bool,
        social_agg: bool,
        return_table: bool,
    ) -> Result<RunOutcome> {
        let options = RunOptions {
            keep_activity,
            social_agg,
            return_table,
        };
        self.run(MetricKind::OriginDestination, options).await
    }

    /// People per residence and overnight-stay zone. Version 2 only. The
    /// column flags are accepted for symmetry with [`Self::get_od_data`] and
    /// leave the output unchanged.
    pub async fn get_overnight_stays_data(
        &self,
        keep_activity: bool,
        social_agg: bool,
        return_table: bool,
    ) -> Result<RunOutcome> {
        let options = RunOptions {
            keep_activity,
            social_agg,
            return_table,
        };
        self.run(MetricKind::OvernightStays, options).await
    }

    /// People by number of trips made. The column flags leave the output
    /// unchanged.
    pub async fn get_number_of_trips_data(
        &self,
        keep_activity: bool,
        social_agg: bool,
        return_table: bool,
    ) -> Result<RunOutcome> {
        let options = RunOptions {
            keep_activity,
            social_agg,
            return_table,
        };
        self.run(MetricKind::TripCounts, options).await
    }

    #[tracing::instrument(
        skip(self, options),
        fields(metric = %metric, version = %self.config.version, zones = %self.config.zones)
    )]
    pub async fn run(&self, metric: MetricKind, options: RunOptions) -> Result<RunOutcome> {
        let version = self.config.version;
        schema_for(version, metric)?;

        let sources = sources::resolve_all(
            version,
            self.config.zones,
            metric,
            &self.dates,
            &self.config.data_directory,
        )?;
        info!(
            dates = sources.len(),
            engine = %self.selection.engine,
            "Starting run"
        );

        let downloads = self.download_all(&sources).await;

        let mut report = RunReport::default();
        let mut combined: Option<CanonicalTable> = None;
        for (source, download) in sources.iter().zip(downloads) {
            if let Err(e) = download {
                warn!(date = %source.date, url = %source.url, error = %e, "Download failed, skipping date");
                report.failures.push(DateFailure {
                    date: source.date,
                    stage: FailureStage::Download,
                    reason: e.to_string(),
                });
                continue;
            }

            let path = source.local_path.clone();
            let column_options = options.column_options();
            let engine = self.selection.engine;
            let parsing = tokio::task::spawn_blocking(move || {
                parser::parse_file(&path, version, metric, column_options, engine)
            })
            .await
            .unwrap_or_else(|e| Err(MobilityError::Other(anyhow::anyhow!("parse task failed: {e}"))));
            let parsed = match parsing {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(date = %source.date, error = %e, "Parse failed, skipping date");
                    report.failures.push(DateFailure {
                        date: source.date,
                        stage: FailureStage::Parse,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            report.processed.push(ProcessedDate {
                date: source.date,
                rows: parsed.table.len(),
                stats: parsed.stats,
            });
            match combined.as_mut() {
                Some(table) => table.append(parsed.table)?,
                None => combined = Some(parsed.table),
            }
        }

        let Some(table) = combined else {
            return Err(MobilityError::NoData {
                skipped: report.skipped(),
            });
        };
        let aggregated = aggregate_canonical(&table)?;

        info!(
            processed = report.processed.len(),
            skipped = report.skipped(),
            rows = aggregated.len(),
            "Run finished"
        );

        let delivery = if options.return_table {
            Delivery::Returned(aggregated)
        } else {
            Delivery::Persisted(self.persist(&aggregated, metric)?)
        };
        Ok(RunOutcome { delivery, report })
    }

    /// Fetches every source with bounded concurrency. Results come back in
    /// the order of `sources`.
    async fn download_all(&self, sources: &[SourceFile]) -> Vec<Result<()>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_downloads));
        let timeout = self.config.download_timeout;

        let mut tasks = Vec::with_capacity(sources.len());
        for source in sources {
            let sem = semaphore.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let url = source.url.clone();
            let path = source.local_path.clone();
            let span = tracing::info_span!("download", date = %source.date);

            let task = tokio::spawn(
                async move {
                    let _permit = sem
                        .acquire()
                        .await
                        .map_err(|e| MobilityError::Other(e.into()))?;
                    match tokio::time::timeout(timeout, fetcher.fetch(&url, &path)).await {
                        Ok(result) => result,
                        Err(_) => Err(MobilityError::Timeout {
                            url,
                            seconds: timeout.as_secs(),
                        }),
                    }
                }
                .instrument(span),
            );
            tasks.push(task);
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(match task.await {
                Ok(result) => result,
                Err(e) => Err(MobilityError::Other(anyhow::anyhow!(
                    "download task failed: {e}"
                ))),
            });
        }
        results
    }

    fn persist(&self, table: &CanonicalTable, metric: MetricKind) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_directory)?;
        let name = sources::output_file_name(
            self.config.version,
            self.config.zones,
            metric,
            self.start,
            self.end,
        )?;
        let path = self.config.output_directory.join(name);
        self.writer.write(table, &path, metric)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves gzip fixtures keyed by cache file name; anything else is a 404.
    #[derive(Default)]
    struct FixtureFetcher {
        files: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl FixtureFetcher {
        fn with(mut self, name: &str, content: &str) -> Self {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content.as_bytes()).unwrap();
            self.files.insert(name.to_string(), encoder.finish().unwrap());
            self
        }
    }

    #[async_trait]
    impl Fetcher for FixtureFetcher {
        async fn fetch(&self, url: &str, local_path: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = local_path.file_name().unwrap().to_string_lossy().to_string();
            match self.files.get(&name) {
                Some(bytes) => Ok(std::fs::write(local_path, bytes)?),
                None => Err(MobilityError::FetchStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        writes: Mutex<Vec<PathBuf>>,
    }

    impl TableWriter for RecordingWriter {
        fn write(&self, _table: &CanonicalTable, destination: &Path, _metric: MetricKind) -> Result<()> {
            self.writes.lock().unwrap().push(destination.to_path_buf());
            Ok(())
        }
    }

    fn config(dir: &Path, start: &str, end: Option<&str>) -> PipelineConfig {
        let mut config = PipelineConfig::new(DatasetVersion::V2, Zones::Municipalities, start);
        config.end_date = end.map(str::to_string);
        config.data_directory = dir.join("data");
        config.output_directory = dir.join("out");
        config.backend = Backend::Pandas;
        config
    }

    fn pipeline(config: PipelineConfig, fetcher: Arc<FixtureFetcher>) -> MobilityPipeline {
        std::fs::create_dir_all(&config.data_directory).unwrap();
        MobilityPipeline::with_collaborators(config, fetcher, Arc::new(RecordingWriter::default()))
            .unwrap()
    }

    const OVERNIGHT: &str = "fecha|zona_residencia|zona_pernoctacion|personas\n\
                             20220101|01001|01009|10\n\
                             20220101|01001|01009|5\n";

    #[test]
    fn test_invalid_configuration_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher: Arc<dyn Fetcher> = Arc::new(FixtureFetcher::default());
        let writer: Arc<dyn TableWriter> = Arc::new(RecordingWriter::default());

        let cases = [
            config(dir.path(), "2022/01/01", None),
            config(dir.path(), "2022-01-05", Some("2022-01-01")),
            config(dir.path(), "2021-12-31", None),
            PipelineConfig::new(DatasetVersion::V1, Zones::LargeUrbanAreas, "2020-03-01"),
            PipelineConfig::new(DatasetVersion::V1, Zones::Districts, "2021-06-01"),
        ];
        for case in cases {
            let err = MobilityPipeline::with_collaborators(case, fetcher.clone(), writer.clone())
                .err()
                .unwrap();
            assert!(err.is_configuration(), "{err}");
        }
    }

    #[test]
    fn test_end_date_defaults_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(config(dir.path(), "2022-03-01", None), Arc::default());
        assert_eq!(p.dates().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_dates_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            FixtureFetcher::default().with("20220101_Pernoctaciones_municipios.csv.gz", OVERNIGHT),
        );
        let p = pipeline(config(dir.path(), "2022-01-01", Some("2022-01-02")), fetcher.clone());

        let outcome = p.get_overnight_stays_data(false, false, true).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.report.processed.len(), 1);
        assert_eq!(outcome.report.skipped(), 1);
        assert_eq!(outcome.report.failures[0].stage, FailureStage::Download);
        let table = outcome.table().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, "people").unwrap().and_then(|c| c.as_f64()), Some(15.0));
    }

    #[tokio::test]
    async fn test_all_dates_failing_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(
            config(dir.path(), "2022-01-01", Some("2022-01-03")),
            Arc::new(FixtureFetcher::default()),
        );
        let err = p.get_overnight_stays_data(false, false, true).await.unwrap_err();
        assert!(matches!(err, MobilityError::NoData { skipped: 3 }));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut fixtures =
            FixtureFetcher::default().with("20220101_Pernoctaciones_municipios.csv.gz", OVERNIGHT);
        fixtures
            .files
            .insert("20220102_Pernoctaciones_municipios.csv.gz".into(), b"garbage".to_vec());
        let p = pipeline(config(dir.path(), "2022-01-01", Some("2022-01-02")), Arc::new(fixtures));

        let outcome = p.get_overnight_stays_data(false, false, true).await.unwrap();
        assert_eq!(outcome.report.failures.len(), 1);
        assert_eq!(outcome.report.failures[0].stage, FailureStage::Parse);
    }

    #[tokio::test]
    async fn test_persisting_returns_path_and_no_table() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            FixtureFetcher::default().with("20220101_Pernoctaciones_municipios.csv.gz", OVERNIGHT),
        );
        let p = pipeline(config(dir.path(), "2022-01-01", None), fetcher);

        let outcome = p.get_overnight_stays_data(false, false, false).await.unwrap();
        assert!(outcome.table().is_none());
        let path = outcome.persisted_path().unwrap();
        assert!(path.ends_with("Pernoctaciones_municipios_2022-01-01_2022-01-01_v2.csv"));
        assert!(dir.path().join("out").is_dir());
    }
}
