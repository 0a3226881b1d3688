// ============================================================
// SPREADSHEET INFRASTRUCTURE LAYER
// ============================================================
// Workbook and delimited-text readers, file fingerprints and the
// pincode directory loader

mod csv_reader;
mod directory_reader;
mod workbook_reader;

pub use csv_reader::{decode_text, detect_delimiter, CsvReader};
pub use directory_reader::read_pincode_directory;
pub use workbook_reader::read_workbook;

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::domain::error::{AppError, Result};
use crate::domain::sheet::RawSheet;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
const TEXT_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Read every sheet of an input file, choosing the reader by extension
pub fn read_source(path: &Path) -> Result<Vec<RawSheet>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        read_workbook(path)
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        let reader = if ext == "tsv" {
            CsvReader::new().with_delimiter(b'\t')
        } else {
            CsvReader::new()
        };
        Ok(vec![reader.read_file(path)?])
    } else {
        Err(AppError::ValidationError(format!(
            "Unsupported input type: {}",
            path.display()
        )))
    }
}

/// Hex SHA-256 of a file's bytes, streamed
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| AppError::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| AppError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_source_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("a.CSV");
        std::fs::write(&csv, "PPO No,DOB\n1,1950\n").unwrap();
        let sheets = read_source(&csv).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].rows.len(), 2);

        let pdf = dir.path().join("a.pdf");
        std::fs::write(&pdf, "x").unwrap();
        assert!(matches!(read_source(&pdf), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            fingerprint_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
