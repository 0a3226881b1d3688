use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    ValidationError(String),
    ParseError(String),
    DatabaseError(String),
    /// Connectivity problem worth one retry (pool timeout, busy database).
    ConnectionError(String),
    IoError(String),
    ConfigError(String),
}

impl AppError {
    /// Classify a sqlx failure. Lock contention and pool exhaustion are
    /// reported as `ConnectionError` so callers can retry the batch once.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.to_string()).unwrap_or_default();
                // SQLITE_BUSY = 5, SQLITE_LOCKED = 6 (extended codes keep the low byte)
                matches!(code.parse::<i64>().map(|c| c & 0xff), Ok(5) | Ok(6))
            }
            _ => false,
        };

        if transient {
            AppError::ConnectionError(format!("{}: {}", context, err))
        } else {
            AppError::DatabaseError(format!("{}: {}", context, err))
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::ConnectionError(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        let err = AppError::from_sqlx("insert batch", sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(err.to_string().starts_with("Connection error: insert batch"));
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        let err = AppError::from_sqlx("fetch", sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
        assert!(matches!(err, AppError::DatabaseError(_)));
    }
}
