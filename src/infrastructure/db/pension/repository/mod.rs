use sqlx::sqlite::SqlitePool;

use crate::domain::error::{AppError, Result};
use crate::domain::settings::DatabaseSettings;

use super::connection::init_pension_db;

mod entities;
mod facts;
mod load_history;
mod pincode_directory;
mod summaries;

pub use load_history::{
    LoadHistoryEntry, LOAD_STATUS_ABORTED, LOAD_STATUS_COMPLETED, LOAD_STATUS_FAILED,
    LOAD_STATUS_UNCHANGED,
};

/// Persistence for facts, summaries, the pincode directory and load history
pub struct PensionRepository {
    pool: SqlitePool,
}

impl PensionRepository {
    /// Open the database described by the settings, creating and
    /// migrating it as needed.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let pool = init_pension_db(settings)
            .await
            .map_err(AppError::ConnectionError)?;
        Ok(Self { pool })
    }

    /// Wrap a pool whose schema is already in place
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool for direct queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::infrastructure::db::pension::connection::prepare_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    /// In-memory repository. One connection, since every `:memory:`
    /// connection is its own database.
    pub(crate) async fn memory_repository() -> PensionRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        prepare_schema(&pool).await.unwrap();
        PensionRepository::from_pool(pool)
    }
}
