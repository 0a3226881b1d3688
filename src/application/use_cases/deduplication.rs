use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::error::{AppError, Result};
use crate::domain::outcome::Admission;
use crate::domain::pensioner::PensionerRecord;

/// At-most-once admission of natural keys.
///
/// Implementations must keep the guarantee across runs and across
/// concurrent writers; the SQLite repository does it with a unique index.
#[async_trait]
pub trait DeduplicationStore: Send + Sync {
    /// Whether the key has already been admitted
    async fn seen(&self, natural_key: &str) -> Result<bool>;

    /// Admit a batch atomically. The returned admissions line up with
    /// `records`; a failed call admits nothing.
    async fn record_batch(
        &self,
        run_id: &str,
        records: &[PensionerRecord],
    ) -> Result<Vec<Admission>>;

    async fn record(&self, run_id: &str, record: &PensionerRecord) -> Result<Admission> {
        let admissions = self
            .record_batch(run_id, std::slice::from_ref(record))
            .await?;
        admissions
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("Empty admission for single record".to_string()))
    }
}

/// Process-local store, for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryDeduplicationStore {
    keys: Mutex<HashSet<String>>,
}

impl InMemoryDeduplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeduplicationStore for InMemoryDeduplicationStore {
    async fn seen(&self, natural_key: &str) -> Result<bool> {
        let keys = self
            .keys
            .lock()
            .map_err(|_| AppError::Internal("Deduplication store poisoned".to_string()))?;
        Ok(keys.contains(natural_key))
    }

    async fn record_batch(
        &self,
        _run_id: &str,
        records: &[PensionerRecord],
    ) -> Result<Vec<Admission>> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| AppError::Internal("Deduplication store poisoned".to_string()))?;
        Ok(records
            .iter()
            .map(|r| {
                if keys.insert(r.natural_key.clone()) {
                    Admission::Accepted
                } else {
                    Admission::Duplicate
                }
            })
            .collect())
    }
}
