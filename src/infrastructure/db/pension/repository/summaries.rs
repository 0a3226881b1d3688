use crate::domain::error::{AppError, Result};
use crate::domain::summary::{GroupingDimension, SummaryBucket, SummaryDrift, SummaryKey};

use super::entities::{parse_category, SummaryRowEntity};
use super::PensionRepository;

/// Live fact-table grouping for one dimension. Null and blank values are
/// not grouped.
fn live_counts_sql(dimension: GroupingDimension) -> String {
    let column = dimension.fact_column();
    format!(
        "SELECT {column} AS dimension_value, age_category, COUNT(*) AS count
         FROM pensioners
         WHERE {column} IS NOT NULL AND TRIM({column}) <> ''
         GROUP BY {column}, age_category"
    )
}

impl PensionRepository {
    /// Rebuild every summary table from the fact table in one transaction.
    /// Returns the fact row count seen by the rebuild and the bucket count
    /// per table.
    pub async fn rebuild_summaries(&self, run_id: &str) -> Result<(u64, Vec<(String, u64)>)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to begin summary transaction", e))?;

        let fact_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pensioners")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to count facts", e))?;

        let mut tables = Vec::with_capacity(GroupingDimension::ALL.len());
        for dimension in GroupingDimension::ALL {
            let table = dimension.table_name();

            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::from_sqlx(&format!("Failed to clear {table}"), e))?;

            let inserted = sqlx::query(&format!(
                "INSERT INTO {table} (dimension_value, age_category, count) {}",
                live_counts_sql(dimension)
            ))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_sqlx(&format!("Failed to repopulate {table}"), e))?;

            tables.push((table.to_string(), inserted.rows_affected()));
        }

        sqlx::query("INSERT INTO summary_runs (run_id, rows_in_fact) VALUES (?, ?)")
            .bind(run_id)
            .bind(fact_rows)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to log summary run", e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to commit summaries", e))?;

        Ok((fact_rows.max(0) as u64, tables))
    }

    pub async fn list_summary(&self, dimension: GroupingDimension) -> Result<Vec<SummaryBucket>> {
        let rows = sqlx::query_as::<_, SummaryRowEntity>(&format!(
            "SELECT dimension_value, age_category, count FROM {}",
            dimension.table_name()
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list summary: {}", e)))?;

        let mut buckets = rows
            .into_iter()
            .map(|row| row.into_bucket(dimension))
            .collect::<Result<Vec<_>>>()?;
        buckets.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(buckets)
    }

    /// Buckets whose stored count differs from the live fact count, in
    /// both directions (stale rows and missing rows).
    pub async fn summary_drift(&self, dimension: GroupingDimension) -> Result<Vec<SummaryDrift>> {
        let table = dimension.table_name();
        let sql = format!(
            "WITH live AS ({live})
             SELECT s.dimension_value, s.age_category, s.count AS stored,
                    COALESCE(l.count, 0) AS actual
             FROM {table} s
             LEFT JOIN live l
               ON l.dimension_value = s.dimension_value AND l.age_category = s.age_category
             WHERE s.count <> COALESCE(l.count, 0)
             UNION ALL
             SELECT l.dimension_value, l.age_category, 0 AS stored, l.count AS actual
             FROM live l
             LEFT JOIN {table} s
               ON l.dimension_value = s.dimension_value AND l.age_category = s.age_category
             WHERE s.dimension_value IS NULL",
            live = live_counts_sql(dimension)
        );

        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to compare summaries: {}", e)))?;

        rows.into_iter()
            .map(|(value, category, stored, actual)| {
                Ok(SummaryDrift {
                    key: SummaryKey {
                        dimension,
                        value,
                        age_category: parse_category(&category)?,
                    },
                    stored: stored.max(0) as u64,
                    actual: actual.max(0) as u64,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::memory_repository;
    use super::*;
    use crate::application::use_cases::deduplication::tests::record;
    use crate::domain::pensioner::AgeCategory;

    #[tokio::test]
    async fn test_rebuild_matches_facts_and_detects_tampering() {
        let repo = memory_repository().await;
        let mut a = record("1");
        a.pensioner_pincode = Some("783301".to_string());
        a.pensioner_state = Some("ASSAM".to_string());
        a.age_category = AgeCategory::Above80;
        let mut b = a.clone();
        b.natural_key = "2".to_string();
        let mut c = record("3");
        c.pensioner_state = Some("ASSAM".to_string());
        repo.insert_pensioners("r", &[a, b, c]).await.unwrap();

        let (facts, tables) = repo.rebuild_summaries("r").await.unwrap();
        assert_eq!(facts, 3);
        assert_eq!(
            tables,
            vec![
                ("summary_by_pincode".to_string(), 1),
                ("summary_by_district".to_string(), 0),
                ("summary_by_state".to_string(), 2),
            ]
        );

        let pincodes = repo.list_summary(GroupingDimension::Pincode).await.unwrap();
        assert_eq!(pincodes.len(), 1);
        assert_eq!(pincodes[0].count, 2);
        assert_eq!(pincodes[0].key.age_category, AgeCategory::Above80);

        for dimension in GroupingDimension::ALL {
            assert!(repo.summary_drift(dimension).await.unwrap().is_empty());
        }

        sqlx::query("UPDATE summary_by_state SET count = 9 WHERE age_category = 'unknown'")
            .execute(repo.pool())
            .await
            .unwrap();
        let drift = repo.summary_drift(GroupingDimension::State).await.unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!((drift[0].stored, drift[0].actual), (9, 1));

        // Rebuilding repairs it.
        repo.rebuild_summaries("r2").await.unwrap();
        assert!(repo.summary_drift(GroupingDimension::State).await.unwrap().is_empty());
    }
}
