//! Row-major grouping for the classic engine.

use std::collections::BTreeMap;

use crate::table::Cell;

/// Where an output column comes from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    /// Group key, copied from input column `idx`.
    Key(usize),
    /// Sum of input column `idx`; missing values count as zero.
    Sum(usize),
}

/// Orderable form of a key cell. Missing sorts first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Null,
    Int(i64),
    Str(String),
}

impl KeyPart {
    fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Null => KeyPart::Null,
            Cell::Int(v) => KeyPart::Int(*v),
            Cell::Str(s) => KeyPart::Str(s.clone()),
            Cell::Num(v) => KeyPart::Str(v.to_string()),
        }
    }

    fn into_cell(self) -> Cell {
        match self {
            KeyPart::Null => Cell::Null,
            KeyPart::Int(v) => Cell::Int(v),
            KeyPart::Str(s) => Cell::Str(s),
        }
    }
}

/// Groups `rows` by the key slots and sums the sum slots. Output rows follow
/// `layout` and are sorted by key.
pub(crate) fn aggregate(rows: &[Vec<Cell>], layout: &[Slot]) -> Vec<Vec<Cell>> {
    let key_idx: Vec<usize> = layout
        .iter()
        .filter_map(|s| match s {
            Slot::Key(i) => Some(*i),
            Slot::Sum(_) => None,
        })
        .collect();
    let sum_idx: Vec<usize> = layout
        .iter()
        .filter_map(|s| match s {
            Slot::Sum(i) => Some(*i),
            Slot::Key(_) => None,
        })
        .collect();

    let mut groups: BTreeMap<Vec<KeyPart>, Vec<f64>> = BTreeMap::new();
    for row in rows {
        let key: Vec<KeyPart> = key_idx.iter().map(|i| KeyPart::from_cell(&row[*i])).collect();
        let totals = groups.entry(key).or_insert_with(|| vec![0.0; sum_idx.len()]);
        for (total, i) in totals.iter_mut().zip(&sum_idx) {
            *total += row[*i].as_f64().unwrap_or(0.0);
        }
    }

    groups
        .into_iter()
        .map(|(key, totals)| {
            let mut keys = key.into_iter();
            let mut sums = totals.into_iter();
            layout
                .iter()
                .map(|slot| match slot {
                    Slot::Key(_) => keys.next().map_or(Cell::Null, KeyPart::into_cell),
                    Slot::Sum(_) => Cell::Num(sums.next().unwrap_or(0.0)),
                })
                .collect()
        })
        .collect()
}
