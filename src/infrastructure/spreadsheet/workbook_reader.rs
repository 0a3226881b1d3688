// ============================================================
// WORKBOOK READER
// ============================================================
// Reads every sheet of an Excel/ODS workbook into RawSheets

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::domain::error::{AppError, Result};
use crate::domain::sheet::{excel_serial_to_date, CellValue, RawRow, RawSheet};

pub fn read_workbook(path: &Path) -> Result<Vec<RawSheet>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        AppError::ParseError(format!("Failed to open workbook {}: {}", path.display(), e))
    })?;

    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for (idx, name) in names.into_iter().enumerate() {
        let range = workbook
            .worksheet_range_at(idx)
            .ok_or_else(|| AppError::NotFound(format!("Worksheet {} missing", name)))?
            .map_err(|e| {
                AppError::ParseError(format!("Failed to read worksheet {}: {}", name, e))
            })?;
        sheets.push(RawSheet::new(name, range_to_rows(&range)));
    }

    Ok(sheets)
}

/// Rows of a range, re-anchored at A1. calamine trims leading empty rows
/// and columns; positional layouts need the original column indices.
fn range_to_rows(range: &Range<Data>) -> Vec<RawRow> {
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<RawRow> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(convert_cell));
        rows.push(cells);
    }
    rows
}

pub fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::text(s.as_str()),
        Data::Int(n) => CellValue::Int(*n),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(CellValue::Date)
            .unwrap_or(CellValue::Float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s.as_str()),
        // Formula errors (#N/A, #REF!) carry no value.
        Data::Error(_) => CellValue::Empty,
    }
}
