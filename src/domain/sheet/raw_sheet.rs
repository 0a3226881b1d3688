// ============================================================
// RAW SHEETS
// ============================================================
// Un-normalized grid of cells for one sheet of one input file

use serde::{Deserialize, Serialize};

use super::CellValue;

/// A single row of cells (positional, may be ragged)
pub type RawRow = Vec<CellValue>;

/// One sheet read from a workbook or a delimited text file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSheet {
    /// Sheet name (file stem for delimited files)
    pub name: String,

    /// All rows in reading order
    pub rows: Vec<RawRow>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Build a sheet from plain strings (handy for fixtures)
    pub fn from_strings(name: impl Into<String>, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| CellValue::text(*cell)).collect())
            .collect();
        Self::new(name, rows)
    }

    /// True when no cell in the sheet carries a value
    pub fn is_blank(&self) -> bool {
        self.rows.iter().all(|row| row_is_blank(row))
    }

    /// First `n` rows, used for header sampling
    pub fn head(&self, n: usize) -> &[RawRow] {
        let end = n.min(self.rows.len());
        &self.rows[..end]
    }

    /// Width of the widest row, ignoring trailing empty cells
    pub fn column_count(&self, sample_rows: usize) -> usize {
        self.head(sample_rows)
            .iter()
            .map(|row| occupied_width(row))
            .max()
            .unwrap_or(0)
    }
}

pub fn row_is_blank(row: &[CellValue]) -> bool {
    row.iter().all(|c| c.is_empty())
}

/// Number of non-empty cells in a row
pub fn non_empty_count(row: &[CellValue]) -> usize {
    row.iter().filter(|c| !c.is_empty()).count()
}

/// Position one past the last non-empty cell
pub fn occupied_width(row: &[CellValue]) -> usize {
    row.iter()
        .rposition(|c| !c.is_empty())
        .map(|idx| idx + 1)
        .unwrap_or(0)
}
