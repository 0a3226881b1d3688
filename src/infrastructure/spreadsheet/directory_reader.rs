use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;

use crate::domain::error::{AppError, Result};
use crate::domain::pincode::PincodeEntry;

use super::csv_reader::{decode_text, detect_delimiter};

#[derive(Debug, Deserialize)]
struct DirectoryRow {
    pincode: String,
    state: String,
    district: String,
    #[serde(default)]
    office_name: Option<String>,
}

/// Load a `pincode,state,district[,office_name]` CSV. Rows with an invalid
/// pincode or blank location are dropped; a malformed file is an error.
pub fn read_pincode_directory(path: &Path) -> Result<Vec<PincodeEntry>> {
    let bytes = std::fs::read(path)
        .map_err(|e| AppError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    let content = decode_text(&bytes);
    parse_directory(&content)
}

fn parse_directory(content: &str) -> Result<Vec<PincodeEntry>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    // Header names are matched case-insensitively.
    let headers = reader
        .headers()
        .map_err(|e| AppError::ParseError(format!("Failed to read directory header: {}", e)))?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase().replace(' ', "_"))
        .collect::<csv::StringRecord>();
    reader.set_headers(headers);

    let mut entries = Vec::new();
    for (index, result) in reader.deserialize::<DirectoryRow>().enumerate() {
        let row = result.map_err(|e| {
            AppError::ParseError(format!("Invalid directory row {}: {}", index + 2, e))
        })?;
        let valid_pincode = row.pincode.len() == 6 && row.pincode.bytes().all(|b| b.is_ascii_digit());
        if !valid_pincode || row.state.is_empty() || row.district.is_empty() {
            continue;
        }
        entries.push(PincodeEntry {
            pincode: row.pincode,
            state: row.state.to_uppercase(),
            district: row.district.to_uppercase(),
            office_name: row.office_name.filter(|o| !o.is_empty()),
        });
    }

    Ok(entries)
}
