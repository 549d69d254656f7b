//! Canonical table produced by the parser and the aggregator.
//!
//! A table always exposes the same columns and cell values; only its storage
//! differs with the [`Engine`] that built it (row-major cells for the classic
//! engine, a polars `DataFrame` for the columnar one).

use serde::Serialize;
use std::fmt;

use crate::engine::Engine;
use crate::error::{MobilityError, Result};
use crate::schema::ColumnType;

/// One canonical value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Str(String),
    Int(i64),
    Num(f64),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Num(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Str(s) => f.write_str(s),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Num(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableColumn {
    pub name: &'static str,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone)]
pub(crate) enum Storage {
    Rows(Vec<Vec<Cell>>),
    #[cfg(feature = "columnar")]
    Frame(polars::prelude::DataFrame),
}

#[derive(Debug, Clone)]
pub struct CanonicalTable {
    columns: Vec<TableColumn>,
    storage: Storage,
}

impl CanonicalTable {
    /// Builds a table from row-major cells, stored the way `engine` stores
    /// data. Every row must have one cell per column.
    pub fn from_rows(columns: Vec<TableColumn>, rows: Vec<Vec<Cell>>, engine: Engine) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(MobilityError::Config(format!(
                "row {bad} has {} cells, expected {}",
                rows[bad].len(),
                columns.len()
            )));
        }
        let storage = match engine {
            Engine::Classic => Storage::Rows(rows),
            #[cfg(feature = "columnar")]
            Engine::Columnar => Storage::Frame(crate::engine::columnar::to_frame(&columns, &rows)?),
            #[cfg(not(feature = "columnar"))]
            Engine::Columnar => Storage::Rows(rows),
        };
        Ok(Self { columns, storage })
    }

    pub(crate) fn from_storage(columns: Vec<TableColumn>, storage: Storage) -> Self {
        Self { columns, storage }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn engine(&self) -> Engine {
        match self.storage {
            Storage::Rows(_) => Engine::Classic,
            #[cfg(feature = "columnar")]
            Storage::Frame(_) => Engine::Columnar,
        }
    }

    pub fn schema(&self) -> &[TableColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Rows(rows) => rows.len(),
            #[cfg(feature = "columnar")]
            Storage::Frame(df) => df.height(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major copy of all cells, in column order.
    pub fn rows(&self) -> Result<Vec<Vec<Cell>>> {
        match &self.storage {
            Storage::Rows(rows) => Ok(rows.clone()),
            #[cfg(feature = "columnar")]
            Storage::Frame(df) => Ok(crate::engine::columnar::frame_rows(df, &self.columns)?),
        }
    }

    pub fn into_rows(self) -> Result<Vec<Vec<Cell>>> {
        match self.storage {
            Storage::Rows(rows) => Ok(rows),
            #[cfg(feature = "columnar")]
            Storage::Frame(ref df) => Ok(crate::engine::columnar::frame_rows(df, &self.columns)?),
        }
    }

    /// All values of one column, or `None` if the column does not exist.
    pub fn column(&self, name: &str) -> Result<Option<Vec<Cell>>> {
        let Some(idx) = self.column_index(name) else {
            return Ok(None);
        };
        Ok(Some(self.rows()?.into_iter().map(|mut r| r.swap_remove(idx)).collect()))
    }

    pub fn get(&self, row: usize, name: &str) -> Result<Option<Cell>> {
        let Some(idx) = self.column_index(name) else {
            return Ok(None);
        };
        Ok(self.rows()?.get(row).map(|r| r[idx].clone()))
    }

    /// Storage type names per column. Engine dependent; values are not.
    pub fn dtypes(&self) -> Vec<String> {
        match &self.storage {
            Storage::Rows(_) => self
                .columns
                .iter()
                .map(|c| match c.column_type {
                    ColumnType::Text => "object".to_string(),
                    ColumnType::Integer => "int64".to_string(),
                    ColumnType::Number => "float64".to_string(),
                })
                .collect(),
            #[cfg(feature = "columnar")]
            Storage::Frame(df) => df.dtypes().iter().map(|d| format!("{d}[polars]")).collect(),
        }
    }

    /// Appends `other` below `self`. Both tables must share the same columns.
    pub fn append(&mut self, other: CanonicalTable) -> Result<()> {
        if self.column_names() != other.column_names() {
            return Err(MobilityError::Config(format!(
                "cannot concatenate tables with columns {:?} and {:?}",
                self.column_names(),
                other.column_names()
            )));
        }
        match (&mut self.storage, other.storage) {
            (Storage::Rows(rows), Storage::Rows(more)) => rows.extend(more),
            #[cfg(feature = "columnar")]
            (Storage::Frame(df), Storage::Frame(more)) => {
                df.vstack_mut(&more)?;
            }
            #[cfg(feature = "columnar")]
            (Storage::Frame(df), Storage::Rows(more)) => {
                let more = crate::engine::columnar::to_frame(&self.columns, &more)?;
                df.vstack_mut(&more)?;
            }
            #[cfg(feature = "columnar")]
            (Storage::Rows(rows), Storage::Frame(more)) => {
                rows.extend(crate::engine::columnar::frame_rows(&more, &self.columns)?);
            }
        }
        Ok(())
    }
}
