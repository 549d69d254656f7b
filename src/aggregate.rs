//! Collapses canonical rows into one row per key by summing measures.

use tracing::debug;

use crate::engine::classic::{self, Slot};
use crate::error::{MobilityError, Result};
use crate::schema::ColumnType;
use crate::table::{CanonicalTable, Storage, TableColumn};

/// Key and measure columns for one aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationPlan {
    pub group_keys: Vec<&'static str>,
    pub sum_keys: Vec<&'static str>,
}

impl AggregationPlan {
    /// Every non-measure column is a key, every measure is summed. Because
    /// the parser has already dropped unrequested dimensions, this yields
    /// `(date, hour, origin, destination)` for a minimal OD table.
    pub fn for_table(table: &CanonicalTable) -> Self {
        let (sums, keys): (Vec<&TableColumn>, Vec<&TableColumn>) = table
            .schema()
            .iter()
            .partition(|c| c.column_type == ColumnType::Number);
        Self {
            group_keys: keys.into_iter().map(|c| c.name).collect(),
            sum_keys: sums.into_iter().map(|c| c.name).collect(),
        }
    }
}

/// Groups `table` by `group_keys` and sums `sum_keys`.
///
/// Output columns keep the table's canonical order (keys and sums
/// interleaved as in the input), rows are sorted by key with missing values
/// first. Missing measures count as zero.
pub fn aggregate(table: &CanonicalTable, group_keys: &[&str], sum_keys: &[&str]) -> Result<CanonicalTable> {
    if group_keys.is_empty() {
        return Err(MobilityError::Config("aggregation needs at least one group key".into()));
    }
    for name in group_keys.iter().chain(sum_keys) {
        if table.column_index(name).is_none() {
            return Err(MobilityError::Config(format!("unknown column '{name}'")));
        }
    }
    if let Some(overlap) = group_keys.iter().find(|k| sum_keys.contains(*k)) {
        return Err(MobilityError::Config(format!(
            "column '{overlap}' cannot be both a key and a sum"
        )));
    }
    for name in sum_keys {
        let column = table.schema().iter().find(|c| c.name == *name);
        if column.is_some_and(|c| c.column_type != ColumnType::Number) {
            return Err(MobilityError::Config(format!("column '{name}' is not numeric")));
        }
    }

    let mut columns = Vec::new();
    let mut layout = Vec::new();
    for (idx, column) in table.schema().iter().enumerate() {
        if group_keys.contains(&column.name) {
            columns.push(*column);
            layout.push(Slot::Key(idx));
        } else if sum_keys.contains(&column.name) {
            columns.push(*column);
            layout.push(Slot::Sum(idx));
        }
    }

    let storage = match table.storage() {
        Storage::Rows(rows) => Storage::Rows(classic::aggregate(rows, &layout)),
        #[cfg(feature = "columnar")]
        Storage::Frame(df) => {
            let keys: Vec<&'static str> = columns
                .iter()
                .filter(|c| group_keys.contains(&c.name))
                .map(|c| c.name)
                .collect();
            let sums: Vec<&'static str> = columns
                .iter()
                .filter(|c| sum_keys.contains(&c.name))
                .map(|c| c.name)
                .collect();
            let order: Vec<&'static str> = columns.iter().map(|c| c.name).collect();
            Storage::Frame(crate::engine::columnar::aggregate(df, &keys, &sums, &order)?)
        }
    };

    let aggregated = CanonicalTable::from_storage(columns, storage);
    debug!(
        input_rows = table.len(),
        output_rows = aggregated.len(),
        engine = %table.engine(),
        "Aggregated table"
    );
    Ok(aggregated)
}

/// Aggregates with the default plan for the table's columns.
pub fn aggregate_canonical(table: &CanonicalTable) -> Result<CanonicalTable> {
    let plan = AggregationPlan::for_table(table);
    aggregate(table, &plan.group_keys, &plan.sum_keys)
}
