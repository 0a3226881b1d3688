use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canonical source columns the mapper tries to locate in a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    PpoNumber,
    BirthDate,
    SanctioningAuthority,
    BranchAddress,
    BranchPincode,
    PensionerAddress,
    PensionerPincode,
    PensionerState,
    PensionerDistrict,
}

impl CanonicalField {
    /// Resolution order. Specific fields come before the generic ones that
    /// share vocabulary (branch pincode before pensioner pincode).
    pub const ALL: [CanonicalField; 9] = [
        CanonicalField::PpoNumber,
        CanonicalField::BirthDate,
        CanonicalField::SanctioningAuthority,
        CanonicalField::BranchPincode,
        CanonicalField::BranchAddress,
        CanonicalField::PensionerPincode,
        CanonicalField::PensionerState,
        CanonicalField::PensionerDistrict,
        CanonicalField::PensionerAddress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::PpoNumber => "ppo_number",
            CanonicalField::BirthDate => "birth_date",
            CanonicalField::SanctioningAuthority => "sanctioning_authority",
            CanonicalField::BranchAddress => "branch_address",
            CanonicalField::BranchPincode => "branch_pincode",
            CanonicalField::PensionerAddress => "pensioner_address",
            CanonicalField::PensionerPincode => "pensioner_pincode",
            CanonicalField::PensionerState => "pensioner_state",
            CanonicalField::PensionerDistrict => "pensioner_district",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        CanonicalField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == key)
            .ok_or_else(|| format!("Unknown canonical field: {}", s))
    }
}

/// Keyword signature recognising one spreadsheet format variant.
///
/// Static configuration: built-in signatures come from `layout_rules`,
/// extra ones may be declared in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSignature {
    pub name: String,

    /// Keywords that must all appear for the signature to qualify
    #[serde(default)]
    pub required_keywords: Vec<String>,

    /// Keywords that only add to the score
    #[serde(default)]
    pub optional_keywords: Vec<String>,

    /// Minimum number of keyword hits (required + optional)
    pub min_matches: usize,

    /// Fixed column positions used when header names cannot be resolved
    #[serde(default)]
    pub positions: BTreeMap<CanonicalField, usize>,
}

impl LayoutSignature {
    pub fn keywords(&self) -> impl Iterator<Item = &String> {
        self.required_keywords
            .iter()
            .chain(self.optional_keywords.iter())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("layout name must not be empty".to_string());
        }
        if self.min_matches == 0 {
            return Err(format!("layout {}: min_matches must be > 0", self.name));
        }
        let total = self.keywords().count();
        if self.min_matches > total {
            return Err(format!(
                "layout {}: min_matches {} exceeds keyword count {}",
                self.name, self.min_matches, total
            ));
        }
        if !self.positions.contains_key(&CanonicalField::PpoNumber) {
            return Err(format!(
                "layout {}: positional table must locate ppo_number",
                self.name
            ));
        }
        Ok(())
    }
}

/// How a layout was chosen for a sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Keyword signature cleared its threshold
    Keywords { score: usize },
    /// No signature qualified; shape guessed from the column count
    Positional { columns: usize },
}

/// Layout chosen for one sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLayout {
    pub name: String,
    pub method: DetectionMethod,
}

impl DetectedLayout {
    pub fn is_positional(&self) -> bool {
        matches!(self.method, DetectionMethod::Positional { .. })
    }
}
