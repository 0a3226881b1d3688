use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::settings::DatabaseSettings;

const PENSION_SCHEMA: &str = include_str!("../../../resources/pension/schema.sql");

const PENSION_SCHEMA_VERSION: i32 = 1;

/// Open (creating if needed) the pension database and bring its schema up
/// to date. Returns the pool the repository runs on.
pub async fn init_pension_db(settings: &DatabaseSettings) -> Result<SqlitePool, String> {
    // NOTE:
    // - PRAGMA user_version tracks the schema version.
    // - Schema statements are additive (CREATE ... IF NOT EXISTS).
    // - A database written by a newer binary is refused.
    if let Some(parent) = settings.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create database directory: {e}"))?;
        }
    }

    let pool = connect_pool(settings).await?;
    prepare_schema(&pool).await?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| format!("Pension database health check failed: {e}"))?;

    Ok(pool)
}

/// Version check plus schema application on an already open pool
pub async fn prepare_schema(pool: &SqlitePool) -> Result<(), String> {
    let current_version = read_user_version(pool).await?;
    if current_version > PENSION_SCHEMA_VERSION {
        return Err(format!(
            "Pension database schema too new: db user_version={} > supported_version={}",
            current_version, PENSION_SCHEMA_VERSION
        ));
    }

    apply_schema(pool).await?;
    set_user_version(pool, PENSION_SCHEMA_VERSION).await
}

fn db_path_to_url(db_path: &Path) -> Result<String, String> {
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| "Pension database path is not valid UTF-8".to_string())?;
    Ok(format!("sqlite://{}", db_path_str.replace('\\', "/")))
}

async fn connect_pool(settings: &DatabaseSettings) -> Result<SqlitePool, String> {
    let db_url = db_path_to_url(&settings.path)?;
    let options = SqliteConnectOptions::from_str(&db_url)
        .map_err(|e| format!("Failed to parse pension database URL: {e}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(settings.busy_timeout_secs));

    SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.busy_timeout_secs.max(5)))
        .connect_with(options)
        .await
        .map_err(|e| format!("Failed to connect to pension database: {e}"))
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), String> {
    for stmt in split_sql_statements(PENSION_SCHEMA) {
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .map_err(|e| format!("Failed to apply pension schema statement: {e}"))?;
    }
    Ok(())
}

async fn read_user_version(pool: &SqlitePool) -> Result<i32, String> {
    sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(|e| format!("Failed to read PRAGMA user_version: {e}"))
}

async fn set_user_version(pool: &SqlitePool, version: i32) -> Result<(), String> {
    let sql = format!("PRAGMA user_version = {}", version);
    sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(|e| format!("Failed to set PRAGMA user_version: {e}"))?;
    Ok(())
}

/// Split a schema script on `;`, ignoring semicolons inside quotes and
/// `--` comments. Comment-only fragments are dropped.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_single = false;
    let mut in_comment = false;

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                buf.push(c);
            }
            continue;
        }
        match c {
            '-' if !in_single && chars.peek() == Some(&'-') => {
                in_comment = true;
            }
            '\'' => {
                in_single = !in_single;
                buf.push(c);
            }
            ';' if !in_single => {
                let stmt = buf.trim();
                if !stmt.is_empty() {
                    out.push(stmt.to_string());
                }
                buf.clear();
            }
            _ => buf.push(c),
        }
    }

    let tail = buf.trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ignores_comments_and_quoted_semicolons() {
        let sql = "-- header; not a statement\nCREATE TABLE a (x TEXT DEFAULT ';');\n\nCREATE INDEX i ON a(x);\n";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TABLE a"));
        assert!(stmts[0].contains("';'"));
    }

    #[test]
    fn test_schema_splits_into_statements() {
        let stmts = split_sql_statements(PENSION_SCHEMA);
        assert!(stmts.iter().any(|s| s.contains("ppo_number TEXT NOT NULL UNIQUE")));
        assert!(stmts.iter().all(|s| s.starts_with("CREATE")));
    }

    #[tokio::test]
    async fn test_init_creates_schema_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DatabaseSettings {
            path: dir.path().join("nested").join("p.db"),
            ..DatabaseSettings::default()
        };
        let pool = init_pension_db(&settings).await.unwrap();
        assert_eq!(read_user_version(&pool).await.unwrap(), PENSION_SCHEMA_VERSION);

        // Re-running against an initialised file is a no-op.
        prepare_schema(&pool).await.unwrap();

        set_user_version(&pool, PENSION_SCHEMA_VERSION + 1).await.unwrap();
        assert!(prepare_schema(&pool).await.is_err());
    }
}
