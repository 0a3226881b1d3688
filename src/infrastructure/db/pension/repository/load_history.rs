use chrono::{DateTime, Utc};

use crate::domain::error::{AppError, Result};

use super::PensionRepository;

pub const LOAD_STATUS_COMPLETED: &str = "completed";
pub const LOAD_STATUS_UNCHANGED: &str = "unchanged";
pub const LOAD_STATUS_ABORTED: &str = "aborted";
pub const LOAD_STATUS_FAILED: &str = "failed";

/// One processed file of one run
#[derive(Debug, Clone, PartialEq)]
pub struct LoadHistoryEntry {
    pub run_id: String,
    pub file_path: String,
    pub file_sha256: Option<String>,
    pub status: String,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub errors: u64,
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PensionRepository {
    pub async fn record_load(&self, entry: &LoadHistoryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO load_history (
                run_id, file_path, file_sha256, status,
                inserted, duplicates, skipped, errors, detail, started_at, finished_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.run_id)
        .bind(&entry.file_path)
        .bind(&entry.file_sha256)
        .bind(&entry.status)
        .bind(entry.inserted as i64)
        .bind(entry.duplicates as i64)
        .bind(entry.skipped as i64)
        .bind(entry.errors as i64)
        .bind(&entry.detail)
        .bind(entry.started_at.to_rfc3339())
        .bind(entry.finished_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to record load history", e))?;
        Ok(())
    }

    /// Whether a file with this fingerprint has completed before
    pub async fn fingerprint_completed(&self, sha256: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM load_history WHERE file_sha256 = ? AND status = ? LIMIT 1",
        )
        .bind(sha256)
        .bind(LOAD_STATUS_COMPLETED)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to query load history: {}", e)))?;
        Ok(found.is_some())
    }

    pub async fn list_loads(&self, run_id: &str) -> Result<Vec<(String, String)>> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT file_path, status FROM load_history WHERE run_id = ? ORDER BY id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list load history: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::memory_repository;
    use super::*;

    #[tokio::test]
    async fn test_fingerprint_lookup_only_counts_completed_loads() {
        let repo = memory_repository().await;
        let now = Utc::now();
        let mut entry = LoadHistoryEntry {
            run_id: "r1".to_string(),
            file_path: "a.csv".to_string(),
            file_sha256: Some("abc".to_string()),
            status: "failed".to_string(),
            inserted: 0,
            duplicates: 0,
            skipped: 0,
            errors: 3,
            detail: Some("disk full".to_string()),
            started_at: now,
            finished_at: now,
        };
        repo.record_load(&entry).await.unwrap();
        assert!(!repo.fingerprint_completed("abc").await.unwrap());

        entry.status = LOAD_STATUS_COMPLETED.to_string();
        repo.record_load(&entry).await.unwrap();
        assert!(repo.fingerprint_completed("abc").await.unwrap());
        assert_eq!(repo.list_loads("r1").await.unwrap().len(), 2);
    }
}
