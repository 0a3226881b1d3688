use std::collections::BTreeMap;

use crate::domain::pensioner::PensionerRecord;
use crate::domain::summary::{GroupingDimension, SummaryBucket, SummaryKey};

/// Folds accepted records into (dimension value, age category) counters.
///
/// Records with a null value for a dimension do not contribute to that
/// dimension, matching the persisted summaries which group non-null values
/// only.
#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    buckets: BTreeMap<SummaryKey, u64>,
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'r>(records: impl IntoIterator<Item = &'r PensionerRecord>) -> Self {
        let mut engine = Self::new();
        for record in records {
            engine.add(record);
        }
        engine
    }

    pub fn add(&mut self, record: &PensionerRecord) {
        for dimension in GroupingDimension::ALL {
            let Some(value) = dimension_value(record, dimension) else {
                continue;
            };
            let key = SummaryKey {
                dimension,
                value: value.to_string(),
                age_category: record.age_category,
            };
            *self.buckets.entry(key).or_insert(0) += 1;
        }
    }

    /// Fold another engine's counters into this one
    pub fn merge(&mut self, other: AggregationEngine) {
        for (key, count) in other.buckets {
            *self.buckets.entry(key).or_insert(0) += count;
        }
    }

    pub fn count(&self, key: &SummaryKey) -> u64 {
        self.buckets.get(key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn buckets(&self) -> Vec<SummaryBucket> {
        self.buckets
            .iter()
            .map(|(key, count)| SummaryBucket {
                key: key.clone(),
                count: *count,
            })
            .collect()
    }

    pub fn buckets_for(&self, dimension: GroupingDimension) -> Vec<SummaryBucket> {
        self.buckets
            .iter()
            .filter(|(key, _)| key.dimension == dimension)
            .map(|(key, count)| SummaryBucket {
                key: key.clone(),
                count: *count,
            })
            .collect()
    }
}

pub fn dimension_value(record: &PensionerRecord, dimension: GroupingDimension) -> Option<&str> {
    let value = match dimension {
        GroupingDimension::Pincode => record.pensioner_pincode.as_deref(),
        GroupingDimension::District => record.pensioner_district.as_deref(),
        GroupingDimension::State => record.pensioner_state.as_deref(),
    };
    value.filter(|v| !v.trim().is_empty())
}
