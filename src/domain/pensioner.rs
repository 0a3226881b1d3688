use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Age bracket used by every summary table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeCategory {
    #[serde(rename = "<60")]
    Below60,
    #[serde(rename = "60-70")]
    From60To70,
    #[serde(rename = "70-80")]
    From70To80,
    #[serde(rename = ">80")]
    Above80,
    #[serde(rename = "unknown")]
    Unknown,
}

impl AgeCategory {
    pub const ALL: [AgeCategory; 5] = [
        AgeCategory::Below60,
        AgeCategory::From60To70,
        AgeCategory::From70To80,
        AgeCategory::Above80,
        AgeCategory::Unknown,
    ];

    /// Bucket an age at the 60/70/80 thresholds. 80 and above is `>80`.
    pub fn from_age(age: Option<i32>) -> Self {
        match age {
            None => AgeCategory::Unknown,
            Some(a) if a < 60 => AgeCategory::Below60,
            Some(a) if a < 70 => AgeCategory::From60To70,
            Some(a) if a < 80 => AgeCategory::From70To80,
            Some(_) => AgeCategory::Above80,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeCategory::Below60 => "<60",
            AgeCategory::From60To70 => "60-70",
            AgeCategory::From70To80 => "70-80",
            AgeCategory::Above80 => ">80",
            AgeCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgeCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown age category: {}", s))
    }
}

/// Sub-fields parsed out of a delimited sanctioning-authority text,
/// e.g. `SPOs,Goalpara Div, Dhubri-783301`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityParts {
    pub authority_type: Option<String>,
    pub authority_division: Option<String>,
    pub authority_area: Option<String>,
    pub authority_pincode: Option<String>,
}

/// One normalized pension-beneficiary entry. Built once per accepted row and
/// never mutated after it leaves the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PensionerRecord {
    /// PPO number or equivalent; never empty
    pub natural_key: String,
    pub birth_year: Option<i32>,
    pub age: Option<i32>,
    pub age_category: AgeCategory,

    pub sanctioning_authority: Option<String>,
    pub authority: AuthorityParts,

    pub disbursing_branch_pincode: Option<String>,
    pub pensioner_pincode: Option<String>,

    pub pensioner_state: Option<String>,
    pub pensioner_district: Option<String>,
    pub branch_state: Option<String>,
    pub branch_district: Option<String>,

    /// Static label from configuration applied to every row of a run
    pub batch_label: Option<String>,

    pub source_file: String,
    pub source_sheet: String,
}

/// Output fields that configuration may override or default-fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
    SanctioningAuthority,
    DisbursingBranchPincode,
    PensionerPincode,
    PensionerState,
    PensionerDistrict,
    BranchState,
    BranchDistrict,
    BatchLabel,
}

impl OutputField {
    pub const ALL: [OutputField; 8] = [
        OutputField::SanctioningAuthority,
        OutputField::DisbursingBranchPincode,
        OutputField::PensionerPincode,
        OutputField::PensionerState,
        OutputField::PensionerDistrict,
        OutputField::BranchState,
        OutputField::BranchDistrict,
        OutputField::BatchLabel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputField::SanctioningAuthority => "sanctioning_authority",
            OutputField::DisbursingBranchPincode => "disbursing_branch_pincode",
            OutputField::PensionerPincode => "pensioner_pincode",
            OutputField::PensionerState => "pensioner_state",
            OutputField::PensionerDistrict => "pensioner_district",
            OutputField::BranchState => "branch_state",
            OutputField::BranchDistrict => "branch_district",
            OutputField::BatchLabel => "batch_label",
        }
    }

    pub fn is_pincode(&self) -> bool {
        matches!(
            self,
            OutputField::DisbursingBranchPincode | OutputField::PensionerPincode
        )
    }
}

impl FromStr for OutputField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        OutputField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == key)
            .ok_or_else(|| format!("Unknown output field: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_bucket_thresholds() {
        assert_eq!(AgeCategory::from_age(Some(59)), AgeCategory::Below60);
        assert_eq!(AgeCategory::from_age(Some(60)), AgeCategory::From60To70);
        assert_eq!(AgeCategory::from_age(Some(69)), AgeCategory::From60To70);
        assert_eq!(AgeCategory::from_age(Some(70)), AgeCategory::From70To80);
        assert_eq!(AgeCategory::from_age(Some(79)), AgeCategory::From70To80);
        assert_eq!(AgeCategory::from_age(Some(80)), AgeCategory::Above80);
        assert_eq!(AgeCategory::from_age(None), AgeCategory::Unknown);
    }

    #[test]
    fn test_age_category_labels_round_trip_through_str() {
        for cat in AgeCategory::ALL {
            assert_eq!(cat.as_str().parse::<AgeCategory>().unwrap(), cat);
        }
        assert!("old".parse::<AgeCategory>().is_err());
    }

    #[test]
    fn test_output_field_from_str() {
        assert_eq!(
            "Pensioner_State".parse::<OutputField>().unwrap(),
            OutputField::PensionerState
        );
        assert!("ppo_number".parse::<OutputField>().is_err());
    }
}
