//! Parser for the gzip-compressed, pipe-delimited MITMA source files.
//!
//! One call reads one daily file into a [`CanonicalTable`]: the header (if
//! any) is detected, each raw column is converted as its [`FieldSpec`]
//! prescribes, and measures go through the numeric normalizer cell by cell.

use csv::{ByteRecord, ReaderBuilder};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::dates::normalize_source_date;
use crate::engine::{self, Engine};
use crate::error::{MobilityError, Result};
use crate::model::{Backend, DatasetVersion, MetricKind};
use crate::numeric::{is_missing_token, normalize_token};
use crate::schema::{schema_for, ColumnOptions, FieldKind, FieldSpec, SourceSchema, Translation};
use crate::table::{CanonicalTable, Cell, TableColumn};

const BOM: char = '\u{feff}';

/// Row- and field-level anomalies seen while parsing one file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub header_detected: bool,
    pub rows_read: usize,
    /// Rows dropped because their field count did not match the header.
    pub rows_skipped: usize,
    /// Cells left missing because their raw token could not be converted.
    pub invalid_values: usize,
    /// Category tokens outside the vocabulary, passed through unchanged.
    pub unknown_categories: usize,
}

#[derive(Debug)]
pub struct ParsedFile {
    pub table: CanonicalTable,
    pub stats: ParseStats,
    /// Set when the requested backend was replaced by the classic engine.
    pub advisory: Option<String>,
}

/// Parses one source file with the given engine.
#[tracing::instrument(skip(path, options), fields(path = %path.display()))]
pub fn parse_file(
    path: &Path,
    version: DatasetVersion,
    metric: MetricKind,
    options: ColumnOptions,
    engine: Engine,
) -> Result<ParsedFile> {
    let schema = schema_for(version, metric)?;
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    let decoder = MultiGzDecoder::new(BufReader::new(file));
    parse_reader(decoder, path, schema, options, engine)
}

/// Parses one file with an explicitly requested backend. The request goes
/// through [`engine::select`], so a columnar request without columnar
/// support falls back exactly as it does for a whole pipeline.
pub fn parse_file_with_backend(
    path: &Path,
    version: DatasetVersion,
    metric: MetricKind,
    options: ColumnOptions,
    backend: Backend,
) -> Result<ParsedFile> {
    let selection = engine::select(backend);
    let mut parsed = parse_file(path, version, metric, options, selection.engine)?;
    parsed.advisory = selection.advisory;
    Ok(parsed)
}

/// Ad-hoc columnar read of a single file. Without columnar support this
/// warns, returns a classic table with identical contents and carries the
/// fallback advisory in [`ParsedFile::advisory`].
pub fn read_columnar(
    path: &Path,
    version: DatasetVersion,
    metric: MetricKind,
    options: ColumnOptions,
) -> Result<ParsedFile> {
    parse_file_with_backend(path, version, metric, options, Backend::Arrow)
}

/// Parses already decompressed pipe-delimited text. `origin` is used for
/// error messages only.
pub fn parse_reader<R: Read>(
    reader: R,
    origin: &Path,
    schema: &SourceSchema,
    options: ColumnOptions,
    engine: Engine,
) -> Result<ParsedFile> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = rdr.byte_records();

    let first = match records.next() {
        None => return Err(MobilityError::EmptyFile(origin.to_path_buf())),
        Some(record) => decode(&record.map_err(|e| unreadable(origin, e))?),
    };

    let mut stats = ParseStats::default();
    let fields = schema.selected_fields(options);

    stats.header_detected = is_header(&first, schema);
    let header: Vec<String> = if stats.header_detected {
        first.iter().map(|t| t.trim().to_lowercase()).collect()
    } else {
        debug!("No header row, assuming the published layout");
        schema.default_header.iter().map(|h| h.to_string()).collect()
    };
    let layout = Layout::resolve(&header, &fields);

    let mut builder = Builder::new(&fields);
    if !stats.header_detected {
        builder.push(&first, &layout, &mut stats);
    }
    for record in records {
        let record = record.map_err(|e| unreadable(origin, e))?;
        builder.push(&decode(&record), &layout, &mut stats);
    }

    if stats.rows_skipped > 0 {
        warn!(
            skipped = stats.rows_skipped,
            read = stats.rows_read,
            "Skipped rows with an unexpected number of fields"
        );
    }

    let (columns, rows) = builder.finish();
    debug!(rows = rows.len(), engine = %engine, "File parsed");
    let table = CanonicalTable::from_rows(columns, rows, engine)?;
    Ok(ParsedFile {
        table,
        stats,
        advisory: None,
    })
}

fn unreadable(path: &Path, err: impl std::fmt::Display) -> MobilityError {
    MobilityError::UnreadableFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Decodes a record as UTF-8 (lossy), dropping a byte-order mark.
fn decode(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let text = String::from_utf8_lossy(field);
            if i == 0 {
                text.trim_start_matches(BOM).to_string()
            } else {
                text.into_owned()
            }
        })
        .collect()
}

fn is_header(record: &[String], schema: &SourceSchema) -> bool {
    let tokens: HashSet<String> = record.iter().map(|t| t.trim().to_lowercase()).collect();
    schema.header_tokens.iter().all(|t| tokens.contains(*t))
}

/// Trims an identifier and removes the `.0` suffix left by float exports.
pub fn clean_identifier(token: &str) -> Option<String> {
    let trimmed = token.trim();
    let cleaned = trimmed.strip_suffix(".0").unwrap_or(trimmed).trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("na") {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Record positions of the selected fields.
struct Layout {
    width: usize,
    positions: Vec<Option<usize>>,
}

impl Layout {
    fn resolve(header: &[String], fields: &[&FieldSpec]) -> Self {
        let positions = fields
            .iter()
            .map(|f| {
                let position = f
                    .raw
                    .iter()
                    .find_map(|raw| header.iter().position(|h| h == raw));
                if position.is_none() && !f.raw.is_empty() {
                    debug!(column = f.column, "Source column absent, filling with missing values");
                }
                position
            })
            .collect();
        Self {
            width: header.len(),
            positions,
        }
    }
}

/// Accumulates canonical rows.
struct Builder<'a> {
    fields: &'a [&'static FieldSpec],
    rows: Vec<Vec<Cell>>,
    reported_unknown: HashSet<(&'static str, String)>,
}

impl<'a> Builder<'a> {
    fn new(fields: &'a [&'static FieldSpec]) -> Self {
        Self {
            fields,
            rows: Vec::new(),
            reported_unknown: HashSet::new(),
        }
    }

    fn push(&mut self, record: &[String], layout: &Layout, stats: &mut ParseStats) {
        stats.rows_read += 1;
        if record.len() != layout.width {
            stats.rows_skipped += 1;
            return;
        }

        let row = self
            .fields
            .iter()
            .zip(&layout.positions)
            .map(|(field, position)| match position {
                None => Cell::Null,
                Some(p) => convert(field, &record[*p], &mut self.reported_unknown, stats),
            })
            .collect();
        self.rows.push(row);
    }

    fn finish(self) -> (Vec<TableColumn>, Vec<Vec<Cell>>) {
        let columns = self
            .fields
            .iter()
            .map(|f| TableColumn {
                name: f.column,
                column_type: f.kind.column_type(),
            })
            .collect();
        (columns, self.rows)
    }
}

fn convert(
    field: &FieldSpec,
    token: &str,
    reported_unknown: &mut HashSet<(&'static str, String)>,
    stats: &mut ParseStats,
) -> Cell {
    match field.kind {
        FieldKind::Date => match normalize_source_date(token) {
            Some(date) => Cell::Str(date),
            None => {
                stats.invalid_values += 1;
                Cell::Null
            }
        },
        FieldKind::Hour => match token.trim().parse::<i64>() {
            Ok(hour) if (0..=23).contains(&hour) => Cell::Int(hour),
            _ => {
                stats.invalid_values += 1;
                Cell::Null
            }
        },
        FieldKind::ZoneId | FieldKind::Label => {
            clean_identifier(token).map_or(Cell::Null, Cell::Str)
        }
        FieldKind::Category(vocabulary) => match vocabulary.translate(token) {
            Translation::Missing => Cell::Null,
            Translation::Known(value) => Cell::Str(value.to_string()),
            Translation::Unknown(value) => {
                stats.unknown_categories += 1;
                if reported_unknown.insert((field.column, value.clone())) {
                    warn!(column = field.column, value = %value, "Unknown category value, passing through");
                }
                Cell::Str(value)
            }
        },
        FieldKind::Measure => match normalize_token(token, true) {
            Some(value) => Cell::Num(value),
            None => {
                if !is_missing_token(token) {
                    stats.invalid_values += 1;
                }
                Cell::Null
            }
        },
    }
}
