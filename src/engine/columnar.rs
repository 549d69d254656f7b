//! Polars-backed storage and grouping for the columnar engine.

use polars::prelude::*;

use crate::schema::ColumnType;
use crate::table::{Cell, TableColumn};

/// Builds a typed `DataFrame` from row-major cells.
pub(crate) fn to_frame(columns: &[TableColumn], rows: &[Vec<Cell>]) -> PolarsResult<DataFrame> {
    let series: Vec<Column> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let name = PlSmallStr::from_static(c.name);
            let s = match c.column_type {
                ColumnType::Text => {
                    let values: Vec<Option<&str>> = rows.iter().map(|r| r[i].as_str()).collect();
                    Series::new(name, values)
                }
                ColumnType::Integer => {
                    let values: Vec<Option<i64>> = rows.iter().map(|r| r[i].as_i64()).collect();
                    Series::new(name, values)
                }
                ColumnType::Number => {
                    let values: Vec<Option<f64>> = rows.iter().map(|r| r[i].as_f64()).collect();
                    Series::new(name, values)
                }
            };
            Column::from(s)
        })
        .collect();
    DataFrame::new(series)
}

/// Reads a frame back into row-major cells, in `columns` order.
pub(crate) fn frame_rows(df: &DataFrame, columns: &[TableColumn]) -> PolarsResult<Vec<Vec<Cell>>> {
    let mut rows: Vec<Vec<Cell>> = (0..df.height())
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();

    for c in columns {
        let series = df.column(c.name)?.as_materialized_series();
        match c.column_type {
            ColumnType::Text => {
                for (row, v) in rows.iter_mut().zip(series.str()?.into_iter()) {
                    row.push(v.map_or(Cell::Null, |s| Cell::Str(s.to_string())));
                }
            }
            ColumnType::Integer => {
                for (row, v) in rows.iter_mut().zip(series.i64()?.into_iter()) {
                    row.push(v.map_or(Cell::Null, Cell::Int));
                }
            }
            ColumnType::Number => {
                for (row, v) in rows.iter_mut().zip(series.f64()?.into_iter()) {
                    row.push(v.map_or(Cell::Null, Cell::Num));
                }
            }
        }
    }
    Ok(rows)
}

/// Lazy group-by with summed measures, sorted by key (missing first) and
/// projected onto `order`.
pub(crate) fn aggregate(
    df: &DataFrame,
    keys: &[&'static str],
    sums: &[&'static str],
    order: &[&'static str],
) -> PolarsResult<DataFrame> {
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let sum_exprs: Vec<Expr> = sums
        .iter()
        .map(|s| col(*s).fill_null(lit(0.0)).sum())
        .collect();
    let order_exprs: Vec<Expr> = order.iter().map(|c| col(*c)).collect();
    let sort_by: Vec<PlSmallStr> = keys.iter().map(|k| PlSmallStr::from_static(*k)).collect();

    df.clone()
        .lazy()
        .group_by(key_exprs)
        .agg(sum_exprs)
        .sort(
            sort_by,
            SortMultipleOptions::default()
                .with_nulls_last(false)
                .with_maintain_order(true),
        )
        .select(order_exprs)
        .collect()
}
