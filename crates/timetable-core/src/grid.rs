//! Flattening extracted grid tables into one row per (date, time slot) cell.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::model::{GridRow, RawTable};

/// Layout options for the extracted tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Leading columns to discard before the date column, e.g. a row index
    /// some extractors prepend.
    pub skip_columns: usize,
}

impl GridOptions {
    #[must_use]
    pub fn with_skip_columns(mut self, n: usize) -> Self {
        self.skip_columns = n;
        self
    }
}

/// Concatenates the per-page tables of one document and unpivots them.
///
/// Every table after the first repeats the header row, which is dropped. The
/// first remaining row names the columns; column 0 is the date and is
/// forward-filled down the rows. Cells are emitted row by row, left to right,
/// and empty cells are dropped.
///
/// # Errors
///
/// Returns [`CoreError::EmptyTable`] when the tables contain no cells below
/// the header.
pub fn normalize_tables(tables: &[RawTable], options: &GridOptions) -> CoreResult<Vec<GridRow>> {
    let rows: Vec<Vec<String>> = tables
        .iter()
        .enumerate()
        .flat_map(|(idx, table)| table.rows.iter().skip(usize::from(idx > 0)))
        .map(|row| row.iter().skip(options.skip_columns).cloned().collect())
        .collect();

    let Some((header, body)) = rows.split_first() else {
        return Err(CoreError::EmptyTable);
    };

    let slot_columns: Vec<(usize, &str)> = header
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(col, label)| {
            let label = label.trim();
            if label.is_empty() {
                warn!(column = col, "skipping column with empty time-slot header");
                None
            } else {
                Some((col, label))
            }
        })
        .collect();

    let mut flattened = Vec::with_capacity(body.len() * slot_columns.len());
    let mut current_date: Option<&str> = None;

    for (idx, row) in body.iter().enumerate() {
        let date_cell = row.first().map(|c| c.trim()).unwrap_or_default();
        if !date_cell.is_empty() {
            current_date = Some(date_cell);
        }
        let Some(date) = current_date else {
            warn!(row = idx + 1, "row has no date and nothing to inherit, skipping");
            continue;
        };

        for &(col, label) in &slot_columns {
            flattened.push(GridRow {
                date: date.to_string(),
                time_slot: label.to_string(),
                raw_text: row.get(col).cloned().unwrap_or_default(),
            });
        }
    }

    if flattened.is_empty() {
        return Err(CoreError::EmptyTable);
    }

    let total = flattened.len();
    flattened.retain(|r| !r.raw_text.is_empty());
    debug!(cells = total, scheduled = flattened.len(), "flattened grid");

    Ok(flattened)
}
