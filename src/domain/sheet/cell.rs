// ============================================================
// CELL VALUES
// ============================================================
// Raw cell contents as read from a workbook or delimited file

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single cell value before any normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl CellValue {
    /// Build a text cell, collapsing whitespace-only input to `Empty`
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Whether the cell holds a number or text that parses as one
    pub fn is_numeric(&self) -> bool {
        match self {
            CellValue::Int(_) | CellValue::Float(_) => true,
            CellValue::Text(s) => {
                let trimmed = s.trim();
                !trimmed.is_empty()
                    && (trimmed.parse::<f64>().is_ok()
                        || trimmed.replace(',', "").parse::<f64>().is_ok())
            }
            _ => false,
        }
    }

    /// Render the cell as trimmed display text.
    ///
    /// Whole floats are printed without a fractional part so that identifiers
    /// and postal codes typed into numeric cells survive (`688002400653.0`
    /// becomes `688002400653`).
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            CellValue::Empty => return None,
            CellValue::Text(s) => clean_text(s),
            CellValue::Int(n) => n.to_string(),
            CellValue::Float(f) => format_float(*f),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Date(d) => d.format("%d-%m-%Y").to_string(),
        };

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Convert an Excel serial day number (1900 date system) to a calendar date
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    // Day 0 is 1899-12-30 once the 1900 leap-year bug is accounted for.
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

fn clean_text(s: &str) -> String {
    // Spreadsheet exports often force text with a leading apostrophe.
    s.trim()
        .trim_matches('"')
        .trim_start_matches('\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}
