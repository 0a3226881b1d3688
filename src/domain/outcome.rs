use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::summary::{MaterializationReport, SummaryBucket};

/// Why a row was not turned into a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingNaturalKey,
}

/// Result of handing a record to the deduplication store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Accepted,
    Duplicate,
}

/// Source text was present but could not be parsed. Not an error; the field
/// is stored as null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGaps {
    pub pincode: bool,
    pub birth_year: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetStatus {
    Processed { layout: String, positional_mapping: bool },
    /// No cell carries a value
    Empty,
    /// The sheet has data but no layout could be chosen
    FormatUndetected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetOutcome {
    pub sheet: String,
    pub status: SheetStatus,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Normalized rows left unwritten after the file failed or was aborted
    pub not_attempted: u64,
    pub unparsed_pincodes: u64,
    pub unparsed_birth_years: u64,
}

impl SheetOutcome {
    pub fn new(sheet: impl Into<String>, status: SheetStatus) -> Self {
        Self {
            sheet: sheet.into(),
            status,
            inserted: 0,
            duplicates: 0,
            skipped: 0,
            errors: 0,
            not_attempted: 0,
            unparsed_pincodes: 0,
            unparsed_birth_years: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Completed,
    /// Fingerprint matched a previously completed load
    Unchanged,
    Aborted,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
    pub sheets: Vec<SheetOutcome>,
}

impl FileOutcome {
    pub fn new(path: PathBuf, status: FileStatus) -> Self {
        Self {
            path,
            status,
            sheets: Vec::new(),
        }
    }

    pub fn inserted(&self) -> u64 {
        self.sheets.iter().map(|s| s.inserted).sum()
    }

    pub fn duplicates(&self) -> u64 {
        self.sheets.iter().map(|s| s.duplicates).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.sheets.iter().map(|s| s.skipped).sum()
    }

    pub fn errors(&self) -> u64 {
        self.sheets.iter().map(|s| s.errors).sum()
    }

    pub fn not_attempted(&self) -> u64 {
        self.sheets.iter().map(|s| s.not_attempted).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryStatus {
    Materialized(MaterializationReport),
    Failed { reason: String },
    NotRun,
}

/// Aggregate result of one batch run, returned to whatever renders it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub errors: u64,
    pub not_attempted: u64,
    pub undetected_sheets: u64,
    pub failed_files: u64,
    pub files: Vec<FileOutcome>,
    /// Buckets contributed by records accepted in this run only
    pub run_buckets: Vec<SummaryBucket>,
    pub summary: SummaryStatus,
}

impl RunOutcome {
    pub fn from_files(run_id: String, files: Vec<FileOutcome>) -> Self {
        let mut outcome = Self {
            run_id,
            inserted: 0,
            duplicates: 0,
            skipped: 0,
            errors: 0,
            not_attempted: 0,
            undetected_sheets: 0,
            failed_files: 0,
            files: Vec::new(),
            run_buckets: Vec::new(),
            summary: SummaryStatus::NotRun,
        };

        for file in &files {
            outcome.inserted += file.inserted();
            outcome.duplicates += file.duplicates();
            outcome.skipped += file.skipped();
            outcome.errors += file.errors();
            outcome.not_attempted += file.not_attempted();
            outcome.undetected_sheets += file
                .sheets
                .iter()
                .filter(|s| s.status == SheetStatus::FormatUndetected)
                .count() as u64;
            if matches!(file.status, FileStatus::Failed { .. }) {
                outcome.failed_files += 1;
            }
        }

        outcome.files = files;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_outcome_totals() {
        let mut ok = FileOutcome::new(PathBuf::from("a.csv"), FileStatus::Completed);
        let mut sheet = SheetOutcome::new(
            "a",
            SheetStatus::Processed {
                layout: "simple".to_string(),
                positional_mapping: false,
            },
        );
        sheet.inserted = 3;
        sheet.duplicates = 1;
        sheet.skipped = 2;
        ok.sheets.push(sheet);
        ok.sheets
            .push(SheetOutcome::new("b", SheetStatus::FormatUndetected));

        let mut failed = FileOutcome::new(
            PathBuf::from("b.xlsx"),
            FileStatus::Failed {
                reason: "disk".to_string(),
            },
        );
        let mut partial = SheetOutcome::new("c", SheetStatus::Empty);
        partial.errors = 5;
        partial.not_attempted = 4;
        failed.sheets.push(partial);

        let outcome = RunOutcome::from_files("run".to_string(), vec![ok, failed]);
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.errors, 5);
        assert_eq!(outcome.not_attempted, 4);
        assert_eq!(outcome.undetected_sheets, 1);
        assert_eq!(outcome.failed_files, 1);
    }
}
