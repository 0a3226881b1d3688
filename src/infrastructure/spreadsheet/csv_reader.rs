// ============================================================
// DELIMITED TEXT READER
// ============================================================
// Reads CSV/TSV exports into a single RawSheet, with encoding and
// delimiter detection

use std::path::Path;

use csv::{ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;

use crate::domain::error::{AppError, Result};
use crate::domain::sheet::{CellValue, RawSheet};

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];
const DELIMITER_SAMPLE_LINES: usize = 10;

/// Reader for delimited text files. Every row is kept, including title and
/// header rows; layout detection decides what they are.
pub struct CsvReader {
    /// Forced delimiter; detected from the content when unset
    delimiter: Option<u8>,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self { delimiter: None }
    }
}

impl CsvReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn read_file(&self, path: &Path) -> Result<RawSheet> {
        let bytes = std::fs::read(path)
            .map_err(|e| AppError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        let content = decode_text(&bytes);
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sheet")
            .to_string();
        self.read_content(name, &content)
    }

    pub fn read_content(&self, name: String, content: &str) -> Result<RawSheet> {
        let delimiter = self
            .delimiter
            .unwrap_or_else(|| detect_delimiter(content));

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                AppError::ParseError(format!("Failed to parse {} row {}: {}", name, index + 1, e))
            })?;
            rows.push(record.iter().map(CellValue::text).collect());
        }

        Ok(RawSheet::new(name, rows))
    }
}

/// UTF-8 (BOM stripped) when valid, Windows-1252 otherwise. Legacy Excel
/// "Save as CSV" output is usually the latter.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

/// Pick the candidate delimiter that appears most often and most
/// consistently across the first lines.
pub fn detect_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(DELIMITER_SAMPLE_LINES)
        .collect();
    if sample.is_empty() {
        return b',';
    }

    let mut best_delimiter = b',';
    let mut best_score = 0.0f32;
    for delimiter in DELIMITER_CANDIDATES {
        let counts: Vec<f32> = sample
            .iter()
            .map(|line| line.bytes().filter(|b| *b == delimiter).count() as f32)
            .collect();
        let avg = counts.iter().sum::<f32>() / counts.len() as f32;
        let variance =
            counts.iter().map(|c| (c - avg).powi(2)).sum::<f32>() / counts.len() as f32;

        // Consistent counts beat occasional bursts.
        let score = avg / (1.0 + variance.sqrt());
        if score > best_score {
            best_score = score;
            best_delimiter = delimiter;
        }
    }

    best_delimiter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(detect_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(detect_delimiter("a,b\n\"x, y\",2\n"), b',');
        assert_eq!(detect_delimiter(""), b',');
    }

    #[test]
    fn test_rows_kept_without_header_handling() {
        let sheet = CsvReader::new()
            .read_content(
                "list".to_string(),
                "Pensioner list\nPPO No,Address\n688002400653,\"Dhubri H.O , Pin- 783301\"\n",
            )
            .unwrap();
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[0], vec![CellValue::text("Pensioner list")]);
        assert_eq!(
            sheet.rows[2][1].as_text().as_deref(),
            Some("Dhubri H.O , Pin- 783301")
        );
    }

    #[test]
    fn test_windows_1252_fallback() {
        let bytes = b"Caf\xe9,1";
        assert_eq!(decode_text(bytes), "Café,1");
        assert_eq!(decode_text(b"\xEF\xBB\xBFa,b"), "a,b");
    }

    #[test]
    fn test_read_file_uses_stem_as_sheet_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dhubri.csv");
        std::fs::write(&path, "a|b\n1|2\n").unwrap();
        let sheet = CsvReader::new().read_file(&path).unwrap();
        assert_eq!(sheet.name, "dhubri");
        assert_eq!(sheet.rows[1].len(), 2);
    }
}
