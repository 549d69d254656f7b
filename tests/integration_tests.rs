use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use spain_mobility::engine::{self, Engine};
use spain_mobility::fetch::Fetcher;
use spain_mobility::output::TableWriter;
use spain_mobility::pipeline::{MobilityPipeline, PipelineConfig};
use spain_mobility::{
    Backend, CanonicalTable, Cell, DatasetVersion, MetricKind, MobilityError, Result, Zones,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// Copies fixtures into the cache, keyed by cache file name, and counts
/// requests. Missing fixtures are 404s. Like the HTTP fetcher it does not
/// touch a non-empty cached file.
#[derive(Default)]
struct FixtureFetcher {
    files: HashMap<String, Vec<u8>>,
    requests: AtomicUsize,
}

impl FixtureFetcher {
    fn with(mut self, name: &str, content: &str) -> Self {
        self.files.insert(name.to_string(), gzip(content));
        self
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, local_path: &Path) -> Result<()> {
        if std::fs::metadata(local_path).map(|m| m.len() > 0).unwrap_or(false) {
            return Ok(());
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
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
    writes: Mutex<Vec<(PathBuf, usize, MetricKind)>>,
}

impl TableWriter for RecordingWriter {
    fn write(&self, table: &CanonicalTable, destination: &Path, metric: MetricKind) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((destination.to_path_buf(), table.len(), metric));
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    config: PipelineConfig,
    fetcher: Arc<FixtureFetcher>,
    writer: Arc<RecordingWriter>,
}

impl Harness {
    fn new(version: DatasetVersion, zones: Zones, start: &str, end: Option<&str>, fetcher: FixtureFetcher) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new(version, zones, start);
        config.end_date = end.map(str::to_string);
        config.data_directory = dir.path().join("data");
        config.output_directory = dir.path().join("output");
        std::fs::create_dir_all(&config.data_directory).unwrap();
        Self {
            _dir: dir,
            config,
            fetcher: Arc::new(fetcher),
            writer: Arc::new(RecordingWriter::default()),
        }
    }

    fn pipeline(&self, backend: Backend) -> MobilityPipeline {
        let mut config = self.config.clone();
        config.backend = backend;
        MobilityPipeline::with_collaborators(config, self.fetcher.clone(), self.writer.clone()).unwrap()
    }

    fn requests(&self) -> usize {
        self.fetcher.requests.load(Ordering::SeqCst)
    }
}

const OD_FILE: &str = "20220101_Viajes_municipios.csv.gz";

const OD_BOM_FLOAT_IDS: &str = "\u{feff}fecha|periodo|origen|destino|distancia|actividad_origen|actividad_destino|estudio_origen_posible|estudio_destino_posible|residencia|renta|edad|sexo|viajes|viajes_km\n\
20220101|00|01001.0|01009.0|2-10|casa|frecuente|no|no|01|10-15|25-45|hombre|1|2\n";

const OD_SHARED_KEY: &str = "fecha|periodo|origen|destino|distancia|actividad_origen|actividad_destino|estudio_origen_posible|estudio_destino_posible|residencia|renta|edad|sexo|viajes|viajes_km\n\
20220101|00|01001|01009|2-10|casa|frecuente|no|no|01|10-15|25-45|hombre|1|2\n\
20220101|00|01001|01009|2-10|trabajo_estudio|no_frecuente|no|no|01|10-15|25-45|mujer|2|3\n";

#[tokio::test]
async fn test_od_bom_header_and_float_ids() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(OD_FILE, OD_BOM_FLOAT_IDS),
    );

    let outcome = h.pipeline(Backend::Pandas).get_od_data(false, false, true).await.unwrap();
    let table = outcome.table().unwrap();

    assert_eq!(
        table.column_names(),
        vec!["date", "hour", "id_origin", "id_destination", "n_trips", "trips_total_length_km"]
    );
    assert_eq!(table.get(0, "date").unwrap(), Some(Cell::Str("2022-01-01".into())));
    assert_eq!(table.get(0, "id_origin").unwrap(), Some(Cell::Str("01001".into())));
    assert_eq!(table.get(0, "id_destination").unwrap(), Some(Cell::Str("01009".into())));
}

#[tokio::test]
async fn test_od_rows_with_shared_key_are_summed() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(OD_FILE, OD_SHARED_KEY),
    );

    let outcome = h.pipeline(Backend::Pandas).get_od_data(false, false, true).await.unwrap();
    let table = outcome.table().unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0, "n_trips").unwrap(), Some(Cell::Num(3.0)));
    assert_eq!(table.get(0, "trips_total_length_km").unwrap(), Some(Cell::Num(5.0)));
}

#[tokio::test]
async fn test_od_keeps_activity_and_social_dimensions() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(OD_FILE, OD_SHARED_KEY),
    );

    let outcome = h.pipeline(Backend::Pandas).get_od_data(true, true, true).await.unwrap();
    let table = outcome.table().unwrap();

    assert_eq!(table.column_names().len(), 11);
    assert_eq!(table.len(), 2);
    let activity_origin = table.column("activity_origin").unwrap().unwrap();
    assert!(activity_origin.contains(&Cell::Str("home".into())));
    assert!(activity_origin.contains(&Cell::Str("work_or_study".into())));
    let activity_destination = table.column("activity_destination").unwrap().unwrap();
    assert!(activity_destination.contains(&Cell::Str("other_frequent".into())));
    assert!(activity_destination.contains(&Cell::Str("other_non_frequent".into())));
    let gender = table.column("gender").unwrap().unwrap();
    assert!(gender.contains(&Cell::Str("male".into())));
    assert!(gender.contains(&Cell::Str("female".into())));
}

#[tokio::test]
async fn test_persisting_delivers_exactly_once() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(OD_FILE, OD_SHARED_KEY),
    );

    let outcome = h.pipeline(Backend::Pandas).get_od_data(false, false, false).await.unwrap();

    assert!(outcome.table().is_none());
    let writes = h.writer.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    let (path, rows, metric) = &writes[0];
    assert_eq!(*rows, 1);
    assert_eq!(*metric, MetricKind::OriginDestination);
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("Viajes"));
    assert_eq!(outcome.persisted_path(), Some(path));
}

#[tokio::test]
async fn test_returning_table_does_not_persist() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(OD_FILE, OD_SHARED_KEY),
    );

    h.pipeline(Backend::Pandas).get_od_data(false, false, true).await.unwrap();
    assert!(h.writer.writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_overnight_stays_v1_fails_before_fetching() {
    let h = Harness::new(
        DatasetVersion::V1,
        Zones::Districts,
        "2020-03-01",
        None,
        FixtureFetcher::default(),
    );

    let err = h.pipeline(Backend::Pandas).get_overnight_stays_data(false, false, true).await.unwrap_err();

    assert!(err.to_string().contains("not available for version 1"));
    assert_eq!(h.requests(), 0);
}

#[tokio::test]
async fn test_overnight_stays_columns() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Districts,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(
            "20220101_Pernoctaciones_distritos.csv.gz",
            "fecha|zona_residencia|zona_pernoctacion|personas\n20220101|01001_AM|01001_AM|1.234.567\n",
        ),
    );

    let outcome = h.pipeline(Backend::Pandas).get_overnight_stays_data(false, false, true).await.unwrap();
    let table = outcome.table().unwrap();

    assert_eq!(
        table.column_names(),
        vec!["date", "residence_area", "overnight_stay_area", "people"]
    );
    assert_eq!(table.get(0, "people").unwrap(), Some(Cell::Num(1234567.0)));
}

#[tokio::test]
async fn test_trip_counts_v2() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(
            "20220101_Personas_municipios.csv.gz",
            "fecha|zona_pernoctacion|edad|sexo|numero_viajes|personas\n20220101|01001|25-45|mujer|2|128.457\n",
        ),
    );

    let outcome = h.pipeline(Backend::Pandas).get_number_of_trips_data(false, false, true).await.unwrap();
    let table = outcome.table().unwrap();

    assert_eq!(
        table.column_names(),
        vec!["date", "overnight_stay_area", "age", "gender", "number_of_trips", "people"]
    );
    assert_eq!(table.get(0, "gender").unwrap(), Some(Cell::Str("female".into())));
    assert_eq!(table.get(0, "people").unwrap(), Some(Cell::Num(128.457)));
}

#[tokio::test]
async fn test_trip_counts_v1_has_empty_demographics() {
    let h = Harness::new(
        DatasetVersion::V1,
        Zones::Districts,
        "2020-03-01",
        None,
        FixtureFetcher::default().with(
            "20200301_maestra2_distritos.txt.gz",
            "fecha|distrito|numero_viajes|personas\n20200301|01001.0|2.0|10\n20200301|01001.0|2.0|5\n",
        ),
    );

    let outcome = h.pipeline(Backend::Pandas).get_number_of_trips_data(false, false, true).await.unwrap();
    let table = outcome.table().unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0, "overnight_stay_area").unwrap(), Some(Cell::Str("01001".into())));
    assert_eq!(table.get(0, "number_of_trips").unwrap(), Some(Cell::Str("2".into())));
    assert_eq!(table.get(0, "age").unwrap(), Some(Cell::Null));
    assert_eq!(table.get(0, "gender").unwrap(), Some(Cell::Null));
    assert_eq!(table.get(0, "people").unwrap(), Some(Cell::Num(15.0)));
}

#[tokio::test]
async fn test_missing_date_is_skipped_and_reported() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        Some("2022-01-03"),
        FixtureFetcher::default()
            .with(OD_FILE, OD_SHARED_KEY)
            .with("20220103_Viajes_municipios.csv.gz", OD_SHARED_KEY.replace("20220101", "20220103").as_str()),
    );

    let outcome = h.pipeline(Backend::Pandas).get_od_data(false, false, true).await.unwrap();

    assert_eq!(outcome.report.processed.len(), 2);
    assert_eq!(outcome.report.skipped(), 1);
    assert_eq!(outcome.report.failures[0].date.to_string(), "2022-01-02");
    let dates = outcome.table().unwrap().column("date").unwrap().unwrap();
    assert_eq!(
        dates,
        vec![Cell::Str("2022-01-01".into()), Cell::Str("2022-01-03".into())]
    );
}

#[tokio::test]
async fn test_no_data_when_every_date_fails() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        Some("2022-01-02"),
        FixtureFetcher::default(),
    );

    let err = h.pipeline(Backend::Pandas).get_od_data(false, false, true).await.unwrap_err();
    assert!(matches!(err, MobilityError::NoData { skipped: 2 }));
}

#[tokio::test]
async fn test_rerun_reuses_cached_files() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(OD_FILE, OD_SHARED_KEY),
    );
    let pipeline = h.pipeline(Backend::Pandas);

    let first = pipeline.get_od_data(false, false, true).await.unwrap();
    let second = pipeline.get_od_data(false, false, true).await.unwrap();

    assert_eq!(h.requests(), 1);
    assert_eq!(
        first.table().unwrap().rows().unwrap(),
        second.table().unwrap().rows().unwrap()
    );
}

#[tokio::test]
async fn test_arrow_request_matches_pandas_output() {
    let h = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(OD_FILE, OD_SHARED_KEY),
    );

    let arrow = h.pipeline(Backend::Arrow);
    let pandas = h.pipeline(Backend::Pandas);

    if engine::columnar_available() {
        assert_eq!(arrow.selection().engine, Engine::Columnar);
    } else {
        assert_eq!(arrow.selection().engine, Engine::Classic);
        let advisory = arrow.selection().advisory.as_deref().unwrap();
        assert!(advisory.contains("Falling back to backend='pandas'"));
    }

    let arrow_out = arrow.get_od_data(true, true, true).await.unwrap();
    let pandas_out = pandas.get_od_data(true, true, true).await.unwrap();
    let arrow_table = arrow_out.table().unwrap();
    let pandas_table = pandas_out.table().unwrap();

    assert_eq!(arrow_table.column_names(), pandas_table.column_names());
    assert_eq!(arrow_table.rows().unwrap(), pandas_table.rows().unwrap());
}

#[tokio::test]
async fn test_column_flags_leave_non_od_columns_unchanged() {
    let stays = Harness::new(
        DatasetVersion::V2,
        Zones::Districts,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(
            "20220101_Pernoctaciones_distritos.csv.gz",
            "fecha|zona_residencia|zona_pernoctacion|personas\n20220101|01001_AM|01001_AM|12\n",
        ),
    );
    let flagged = stays.pipeline(Backend::Pandas).get_overnight_stays_data(true, true, true).await.unwrap();
    let plain = stays.pipeline(Backend::Pandas).get_overnight_stays_data(false, false, true).await.unwrap();
    assert_eq!(
        flagged.table().unwrap().column_names(),
        vec!["date", "residence_area", "overnight_stay_area", "people"]
    );
    assert_eq!(flagged.table().unwrap().rows().unwrap(), plain.table().unwrap().rows().unwrap());

    let trips = Harness::new(
        DatasetVersion::V2,
        Zones::Municipalities,
        "2022-01-01",
        None,
        FixtureFetcher::default().with(
            "20220101_Personas_municipios.csv.gz",
            "fecha|zona_pernoctacion|edad|sexo|numero_viajes|personas\n20220101|01001|25-45|mujer|2|7\n",
        ),
    );
    let flagged = trips.pipeline(Backend::Pandas).get_number_of_trips_data(true, true, true).await.unwrap();
    let plain = trips.pipeline(Backend::Pandas).get_number_of_trips_data(false, false, true).await.unwrap();
    assert_eq!(
        flagged.table().unwrap().column_names(),
        vec!["date", "overnight_stay_area", "age", "gender", "number_of_trips", "people"]
    );
    assert_eq!(flagged.table().unwrap().rows().unwrap(), plain.table().unwrap().rows().unwrap());
}
