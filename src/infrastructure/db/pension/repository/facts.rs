use async_trait::async_trait;

use crate::application::use_cases::deduplication::DeduplicationStore;
use crate::domain::error::{AppError, Result};
use crate::domain::outcome::Admission;
use crate::domain::pensioner::PensionerRecord;

use super::entities::PensionerEntity;
use super::PensionRepository;

const INSERT_PENSIONER: &str = "INSERT INTO pensioners (
        ppo_number, birth_year, age, age_category,
        sanctioning_authority, authority_type, authority_division, authority_area, authority_pincode,
        disbursing_branch_pincode, pensioner_pincode,
        pensioner_state, pensioner_district, branch_state, branch_district,
        batch_label, source_file, source_sheet, run_id
     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(ppo_number) DO NOTHING";

impl PensionRepository {
    /// Insert a batch inside one transaction. A row the unique index
    /// rejects comes back as `Duplicate`; any other failure rolls the
    /// whole batch back.
    pub async fn insert_pensioners(
        &self,
        run_id: &str,
        records: &[PensionerRecord],
    ) -> Result<Vec<Admission>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to begin transaction", e))?;

        let mut admissions = Vec::with_capacity(records.len());
        for record in records {
            let res = sqlx::query(INSERT_PENSIONER)
                .bind(&record.natural_key)
                .bind(record.birth_year)
                .bind(record.age)
                .bind(record.age_category.as_str())
                .bind(&record.sanctioning_authority)
                .bind(&record.authority.authority_type)
                .bind(&record.authority.authority_division)
                .bind(&record.authority.authority_area)
                .bind(&record.authority.authority_pincode)
                .bind(&record.disbursing_branch_pincode)
                .bind(&record.pensioner_pincode)
                .bind(&record.pensioner_state)
                .bind(&record.pensioner_district)
                .bind(&record.branch_state)
                .bind(&record.branch_district)
                .bind(&record.batch_label)
                .bind(&record.source_file)
                .bind(&record.source_sheet)
                .bind(run_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::from_sqlx("Failed to insert pensioner", e))?;

            admissions.push(if res.rows_affected() == 0 {
                Admission::Duplicate
            } else {
                Admission::Accepted
            });
        }

        tx.commit()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to commit pensioner batch", e))?;

        Ok(admissions)
    }

    pub async fn pensioner_exists(&self, ppo_number: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM pensioners WHERE ppo_number = ?")
            .bind(ppo_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to look up pensioner", e))?;
        Ok(found.is_some())
    }

    pub async fn get_pensioner(&self, ppo_number: &str) -> Result<PensionerRecord> {
        let entity = sqlx::query_as::<_, PensionerEntity>(
            "SELECT ppo_number, birth_year, age, age_category,
                    sanctioning_authority, authority_type, authority_division, authority_area,
                    authority_pincode, disbursing_branch_pincode, pensioner_pincode,
                    pensioner_state, pensioner_district, branch_state, branch_district,
                    batch_label, source_file, source_sheet
             FROM pensioners WHERE ppo_number = ?",
        )
        .bind(ppo_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch pensioner: {}", e)))?;

        match entity {
            Some(entity) => entity.try_into(),
            None => Err(AppError::NotFound(format!("Pensioner not found: {}", ppo_number))),
        }
    }

    pub async fn count_pensioners(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pensioners")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count pensioners: {}", e)))?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl DeduplicationStore for PensionRepository {
    async fn seen(&self, natural_key: &str) -> Result<bool> {
        self.pensioner_exists(natural_key).await
    }

    async fn record_batch(
        &self,
        run_id: &str,
        records: &[PensionerRecord],
    ) -> Result<Vec<Admission>> {
        self.insert_pensioners(run_id, records).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::memory_repository;
    use super::*;
    use crate::application::use_cases::deduplication::tests::record;
    use crate::domain::pensioner::AgeCategory;

    #[tokio::test]
    async fn test_duplicate_keys_are_not_inserted_twice() {
        let repo = memory_repository().await;

        let mut first = record("688002400653");
        first.birth_year = Some(1946);
        first.age = Some(78);
        first.age_category = AgeCategory::From70To80;
        first.pensioner_pincode = Some("783301".to_string());

        let admissions = repo
            .insert_pensioners("run-1", &[first.clone(), record("2"), record("2")])
            .await
            .unwrap();
        assert_eq!(
            admissions,
            vec![Admission::Accepted, Admission::Accepted, Admission::Duplicate]
        );

        let again = repo.record("run-2", &first).await.unwrap();
        assert_eq!(again, Admission::Duplicate);
        assert_eq!(repo.count_pensioners().await.unwrap(), 2);

        let stored = repo.get_pensioner("688002400653").await.unwrap();
        assert_eq!(stored, first);
        assert!(repo.seen("2").await.unwrap());
        assert!(matches!(
            repo.get_pensioner("missing").await,
            Err(AppError::NotFound(_))
        ));
    }
}
