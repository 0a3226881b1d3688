// ============================================================
// SETTINGS
// ============================================================
// Tunable parameters for the loader. Loaded by infrastructure::config.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use validator::Validate;

use super::layout::{CanonicalField, LayoutSignature};
use super::pensioner::OutputField;

/// Upper bound on header rows sampled for detection
pub const MAX_HEADER_SCAN_ROWS: usize = 15;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    #[serde(default)]
    pub database: DatabaseSettings,

    #[validate(nested)]
    #[serde(default)]
    pub ingestion: IngestionSettings,

    #[serde(default)]
    pub normalization: NormalizationSettings,

    /// Extra layout signatures, registered after the built-in ones
    #[serde(default)]
    pub layouts: Vec<LayoutSignature>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseSettings {
    /// SQLite database file
    pub path: PathBuf,

    #[validate(range(min = 1, max = 32))]
    pub max_connections: u32,

    #[validate(range(min = 1, max = 300))]
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pensioners.db"),
            max_connections: 4,
            busy_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IngestionSettings {
    /// Files to load when the binary runs
    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    /// Records buffered per insert transaction
    #[validate(range(min = 1, max = 100000))]
    pub batch_size: usize,

    /// Files processed in parallel
    #[validate(range(min = 1, max = 64))]
    pub max_workers: usize,

    /// Rows sampled for layout detection (capped at 15)
    #[validate(range(min = 1, max = 15))]
    pub header_scan_rows: usize,

    /// Fraction of a layout's fields that must resolve by header name
    /// before the positional table is ignored
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_name_match_ratio: f32,

    /// Column count at or above which an unrecognised sheet is treated
    /// as the detailed ("enhanced") shape
    #[validate(range(min = 2))]
    pub detailed_min_columns: usize,

    /// Sheets narrower than this are reported as undetected
    #[validate(range(min = 1))]
    pub min_columns: usize,

    /// Year ages are computed against; current year when absent
    #[serde(default)]
    pub reference_year: Option<i32>,

    pub retry_backoff_ms: u64,

    /// Skip files whose SHA-256 already completed in an earlier run
    pub skip_unchanged_files: bool,

    /// Compare summary tables against a live GROUP BY after materializing
    pub verify_summaries: bool,

    /// Optional CSV with pincode,state,district[,office_name]
    #[serde(default)]
    pub pincode_directory: Option<PathBuf>,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            batch_size: 500,
            max_workers: 4,
            header_scan_rows: MAX_HEADER_SCAN_ROWS,
            min_name_match_ratio: 0.5,
            detailed_min_columns: 6,
            min_columns: 2,
            reference_year: None,
            retry_backoff_ms: 250,
            skip_unchanged_files: false,
            verify_summaries: true,
            pincode_directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationSettings {
    /// State names searched for in free-text addresses (upper case)
    pub known_states: Vec<String>,

    /// Constant label written to every record of a run
    #[serde(default)]
    pub batch_label: Option<String>,

    /// Constants applied to every row, replacing extracted values
    #[serde(default)]
    pub field_overrides: BTreeMap<OutputField, String>,

    /// Values used when a field came out null
    #[serde(default)]
    pub default_fill: BTreeMap<OutputField, String>,

    /// Additional header phrases per canonical field
    #[serde(default)]
    pub extra_aliases: BTreeMap<CanonicalField, Vec<String>>,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        Self {
            known_states: default_known_states(),
            batch_label: None,
            field_overrides: BTreeMap::new(),
            default_fill: BTreeMap::new(),
            extra_aliases: BTreeMap::new(),
        }
    }
}

impl NormalizationSettings {
    /// Checks that cannot be expressed as field attributes
    pub fn validate(&self) -> Result<(), String> {
        if self.known_states.iter().any(|s| s.trim().is_empty()) {
            return Err("known_states must not contain blank names".to_string());
        }
        for (label, map) in [
            ("field_overrides", &self.field_overrides),
            ("default_fill", &self.default_fill),
        ] {
            for (field, value) in map {
                if field.is_pincode() && !is_six_digits(value) {
                    return Err(format!(
                        "{}.{} must be a 6-digit pincode, got {:?}",
                        label,
                        field.as_str(),
                        value
                    ));
                }
            }
        }
        Ok(())
    }
}

fn is_six_digits(value: &str) -> bool {
    value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit())
}

pub fn default_known_states() -> Vec<String> {
    [
        // Multi-word names first so "WEST BENGAL" wins over any shorter overlap.
        "ANDAMAN AND NICOBAR ISLANDS",
        "DADRA AND NAGAR HAVELI AND DAMAN AND DIU",
        "JAMMU AND KASHMIR",
        "ANDHRA PRADESH",
        "ARUNACHAL PRADESH",
        "HIMACHAL PRADESH",
        "MADHYA PRADESH",
        "UTTAR PRADESH",
        "TAMIL NADU",
        "WEST BENGAL",
        "ASSAM",
        "BIHAR",
        "CHHATTISGARH",
        "CHANDIGARH",
        "DELHI",
        "GOA",
        "GUJARAT",
        "HARYANA",
        "JHARKHAND",
        "KARNATAKA",
        "KERALA",
        "LADAKH",
        "LAKSHADWEEP",
        "MAHARASHTRA",
        "MANIPUR",
        "MEGHALAYA",
        "MIZORAM",
        "NAGALAND",
        "ODISHA",
        "PUDUCHERRY",
        "PUNJAB",
        "RAJASTHAN",
        "SIKKIM",
        "TELANGANA",
        "TRIPURA",
        "UTTARAKHAND",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.normalization.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut settings = Settings::default();
        settings.ingestion.header_scan_rows = 40;
        settings.ingestion.batch_size = 0;
        assert!(settings.validate().is_err());

        let err = settings.ingestion.validate().unwrap_err();
        let fields = err.field_errors();
        assert!(fields.contains_key("header_scan_rows"));
        assert!(fields.contains_key("batch_size"));
    }

    #[test]
    fn test_pincode_override_must_be_six_digits() {
        let mut norm = NormalizationSettings::default();
        norm.field_overrides
            .insert(OutputField::PensionerPincode, "7833".to_string());
        assert!(norm.validate().is_err());

        norm.field_overrides
            .insert(OutputField::PensionerPincode, "783301".to_string());
        norm.default_fill
            .insert(OutputField::PensionerState, "ASSAM".to_string());
        assert!(norm.validate().is_ok());
    }
}
