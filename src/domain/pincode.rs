use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the postal directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PincodeEntry {
    pub pincode: String,
    pub state: String,
    pub district: String,
    #[serde(default)]
    pub office_name: Option<String>,
}

/// Pincode → location lookup consulted before free-text extraction
#[derive(Debug, Clone, Default)]
pub struct PincodeDirectory {
    entries: HashMap<String, PincodeEntry>,
}

impl PincodeDirectory {
    pub fn new(entries: impl IntoIterator<Item = PincodeEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.pincode.clone(), e))
                .collect(),
        }
    }

    pub fn lookup(&self, pincode: &str) -> Option<&PincodeEntry> {
        self.entries.get(pincode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
