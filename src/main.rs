//! CLI entry point for the Spanish mobility data tool.
//!
//! Each subcommand downloads one metric for a date range, aggregates it and
//! either persists the result as CSV or prints it.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use spain_mobility::config::Settings;
use spain_mobility::pipeline::{Delivery, MobilityPipeline, PipelineConfig, RunOptions};
use spain_mobility::{Backend, CanonicalTable, DatasetVersion, MetricKind, Zones};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "spain_mobility")]
#[command(about = "Download and aggregate MITMA mobility data for Spain", long_about = None)]
struct Cli {
    /// Optional JSON settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Origin-destination trips between zones
    Od {
        #[command(flatten)]
        common: CommonArgs,

        /// Keep trip purpose columns (activity_origin, activity_destination)
        #[arg(long, default_value_t = false)]
        keep_activity: bool,

        /// Keep socio-demographic columns (income, age, gender)
        #[arg(long, default_value_t = false)]
        social_agg: bool,
    },
    /// People per residence zone and overnight-stay zone (version 2 only)
    OvernightStays {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// People by number of trips made
    Trips {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Dataset version: 1 (2020-2021) or 2 (2022 onwards)
    #[arg(long = "dataset-version", default_value = "2")]
    dataset_version: DatasetVersion,

    /// Zone granularity: districts, municipalities or large_urban_areas
    #[arg(short, long, default_value = "municipalities")]
    zones: Zones,

    /// First date, YYYY-MM-DD
    #[arg(short, long)]
    start: String,

    /// Last date, YYYY-MM-DD (defaults to --start)
    #[arg(short, long)]
    end: Option<String>,

    /// Parsing backend: arrow or pandas
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Directory for downloaded source files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for result files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the aggregated table to stdout instead of writing a file
    #[arg(long, default_value_t = false)]
    print: bool,

    /// Write the per-date run report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/spain_mobility.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("spain_mobility.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = Settings::resolve(cli.config.as_deref())?;

    let (metric, common, keep_activity, social_agg) = match cli.command {
        Commands::Od {
            common,
            keep_activity,
            social_agg,
        } => (MetricKind::OriginDestination, common, keep_activity, social_agg),
        Commands::OvernightStays { common } => (MetricKind::OvernightStays, common, false, false),
        Commands::Trips { common } => (MetricKind::TripCounts, common, false, false),
    };

    let mut config = PipelineConfig::from_settings(
        &settings,
        common.dataset_version,
        common.zones,
        common.start,
        common.end,
    );
    if let Some(backend) = common.backend {
        config.backend = backend;
    }
    if let Some(dir) = common.data_dir {
        config.data_directory = dir;
    }
    if let Some(dir) = common.output_dir {
        config.output_directory = dir;
    }

    std::fs::create_dir_all(&config.data_directory).with_context(|| {
        format!("cannot create data directory {}", config.data_directory.display())
    })?;

    let pipeline = MobilityPipeline::new(config)?;

    let options = RunOptions {
        keep_activity,
        social_agg,
        return_table: common.print,
    };
    let outcome = pipeline.run(metric, options).await?;

    for failure in &outcome.report.failures {
        warn!(date = %failure.date, stage = ?failure.stage, reason = %failure.reason, "Date skipped");
    }
    if let Some(path) = &common.report {
        std::fs::write(path, serde_json::to_string_pretty(&outcome.report)?)?;
        info!(path = %path.display(), "Run report written");
    }

    match outcome.delivery {
        Delivery::Returned(table) => print_table(&table)?,
        Delivery::Persisted(path) => info!(path = %path.display(), "Results saved"),
    }

    Ok(())
}

/// Writes the table as CSV to stdout.
fn print_table(table: &CanonicalTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_writer(std::io::stdout());
    writer.write_record(table.column_names())?;
    for row in table.rows()? {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
