use crate::domain::error::{AppError, Result};
use crate::domain::pincode::{PincodeDirectory, PincodeEntry};

use super::entities::PincodeEntity;
use super::PensionRepository;

impl PensionRepository {
    /// Insert or refresh directory rows in one transaction
    pub async fn upsert_pincodes(&self, entries: &[PincodeEntry]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to begin transaction", e))?;

        let mut affected = 0u64;
        for entry in entries {
            let res = sqlx::query(
                "INSERT INTO pincode_directory (pincode, state, district, office_name)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(pincode) DO UPDATE SET
                    state = excluded.state,
                    district = excluded.district,
                    office_name = COALESCE(excluded.office_name, pincode_directory.office_name)",
            )
            .bind(&entry.pincode)
            .bind(&entry.state)
            .bind(&entry.district)
            .bind(&entry.office_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to upsert pincode", e))?;
            affected += res.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to commit pincode directory", e))?;

        Ok(affected)
    }

    pub async fn load_pincode_directory(&self) -> Result<PincodeDirectory> {
        let rows = sqlx::query_as::<_, PincodeEntity>(
            "SELECT pincode, state, district, office_name FROM pincode_directory",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to load pincode directory: {}", e)))?;

        Ok(PincodeDirectory::new(rows.into_iter().map(PincodeEntry::from)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::memory_repository;
    use super::*;

    fn entry(pincode: &str, district: &str, office: Option<&str>) -> PincodeEntry {
        PincodeEntry {
            pincode: pincode.to_string(),
            state: "ASSAM".to_string(),
            district: district.to_string(),
            office_name: office.map(|o| o.to_string()),
        }
    }

    #[tokio::test]
    async fn test_upsert_refreshes_existing_rows() {
        let repo = memory_repository().await;
        repo.upsert_pincodes(&[entry("783301", "DHUBRI", Some("Dhubri H.O"))])
            .await
            .unwrap();
        repo.upsert_pincodes(&[entry("783301", "DHUBRI (NEW)", None), entry("783101", "GOALPARA", None)])
            .await
            .unwrap();

        let directory = repo.load_pincode_directory().await.unwrap();
        assert_eq!(directory.len(), 2);
        let dhubri = directory.lookup("783301").unwrap();
        assert_eq!(dhubri.district, "DHUBRI (NEW)");
        assert_eq!(dhubri.office_name.as_deref(), Some("Dhubri H.O"));
    }
}
