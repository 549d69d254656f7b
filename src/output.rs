//! Persistence of aggregated tables.
//!
//! Results are written as comma-separated CSV with a header row; missing
//! cells are written as empty fields.

use csv::WriterBuilder;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::MetricKind;
use crate::table::CanonicalTable;

/// Writes a finished table to its destination.
pub trait TableWriter: Send + Sync {
    fn write(&self, table: &CanonicalTable, destination: &Path, metric: MetricKind) -> Result<()>;
}

/// Writes tables as CSV, replacing any existing file.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvTableWriter;

impl TableWriter for CsvTableWriter {
    fn write(&self, table: &CanonicalTable, destination: &Path, metric: MetricKind) -> Result<()> {
        debug!(path = %destination.display(), rows = table.len(), "Writing CSV");

        let file = File::create(destination)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        writer.write_record(table.column_names())?;
        for row in table.rows()? {
            writer.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        writer.flush()?;

        info!(
            path = %destination.display(),
            rows = table.len(),
            metric = %metric,
            "Table persisted"
        );
        Ok(())
    }
}
