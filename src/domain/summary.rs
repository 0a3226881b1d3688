use serde::{Deserialize, Serialize};
use std::fmt;

use super::pensioner::AgeCategory;

/// Grouping dimension of a summary table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingDimension {
    Pincode,
    District,
    State,
}

impl GroupingDimension {
    pub const ALL: [GroupingDimension; 3] = [
        GroupingDimension::Pincode,
        GroupingDimension::District,
        GroupingDimension::State,
    ];

    /// Persisted summary table for this dimension
    pub fn table_name(&self) -> &'static str {
        match self {
            GroupingDimension::Pincode => "summary_by_pincode",
            GroupingDimension::District => "summary_by_district",
            GroupingDimension::State => "summary_by_state",
        }
    }

    /// Fact-table column the dimension groups on
    pub fn fact_column(&self) -> &'static str {
        match self {
            GroupingDimension::Pincode => "pensioner_pincode",
            GroupingDimension::District => "pensioner_district",
            GroupingDimension::State => "pensioner_state",
        }
    }
}

impl fmt::Display for GroupingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupingDimension::Pincode => "pincode",
            GroupingDimension::District => "district",
            GroupingDimension::State => "state",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SummaryKey {
    pub dimension: GroupingDimension,
    pub value: String,
    pub age_category: AgeCategory,
}

/// Counter for one (dimension value, age category) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBucket {
    pub key: SummaryKey,
    pub count: u64,
}

/// Mismatch between a persisted bucket and the live fact-table count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDrift {
    pub key: SummaryKey,
    pub stored: u64,
    pub actual: u64,
}

/// Result of one materialization pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterializationReport {
    pub fact_rows: u64,
    /// (table, bucket count)
    pub tables: Vec<(String, u64)>,
    pub drift: Vec<SummaryDrift>,
}
