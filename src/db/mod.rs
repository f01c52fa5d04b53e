/// Database layer for coregate
///
/// Manages the SQLite connection pool, schema bootstrap, and the seed
/// admin identity for freshly created stores. The schema is built from
/// the static column metadata in `models`, never by reflecting over a
/// live record.

pub mod models;

use crate::config::{BOOTSTRAP_ADMIN_EMAIL, BOOTSTRAP_ADMIN_SECRET};
use crate::credential::CredentialStore;
use crate::error::GateResult;
use chrono::Utc;
use models::{ColumnDef, EVENT_COLUMNS, IDENTITY_COLUMNS};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool, owned for the lifetime of the process
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> GateResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

fn create_table_sql(table: &str, columns: &[ColumnDef]) -> String {
    let body = columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.sql_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, {})",
        table, body
    )
}

/// Create the `identities` and `events` tables if they do not exist
pub async fn init_schema(pool: &SqlitePool) -> GateResult<()> {
    sqlx::query(&create_table_sql("identities", IDENTITY_COLUMNS))
        .execute(pool)
        .await?;

    sqlx::query(&create_table_sql("events", EVENT_COLUMNS))
        .execute(pool)
        .await?;

    Ok(())
}

/// Seed the well-known bootstrap admin when the store is freshly created.
/// No-op if any identity already exists.
pub async fn seed_bootstrap_admin(pool: &SqlitePool) -> GateResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM identities")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Ok(false);
    }

    let cred = CredentialStore::new().generate(BOOTSTRAP_ADMIN_EMAIL, BOOTSTRAP_ADMIN_SECRET);
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO identities (email, name, role, last_mod_by, last_mod, first_login, last_login, salt, hash)
         VALUES (?1, ?2, 'admin', 'bootstrap', ?3, ?3, ?3, ?4, ?5)",
    )
    .bind(BOOTSTRAP_ADMIN_EMAIL)
    .bind("Admin User")
    .bind(now)
    .bind(&cred.salt)
    .bind(&cred.hash)
    .execute(pool)
    .await?;

    tracing::info!("Seeded bootstrap admin identity");
    Ok(true)
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> GateResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // A single connection so every query sees the same in-memory database.
    // The acquire-time ping and the background reaper are disabled because
    // their timers misfire under tokio's auto-advancing paused test clock.
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .test_before_acquire(false)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(":memory:")
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_bootstrap_is_idempotent() {
        let pool = memory_pool().await;

        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        test_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_seed_admin_once() {
        let pool = memory_pool().await;
        init_schema(&pool).await.unwrap();

        assert!(seed_bootstrap_admin(&pool).await.unwrap());
        // Second call sees the existing identity and does nothing
        assert!(!seed_bootstrap_admin(&pool).await.unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM identities")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let role: String = sqlx::query_scalar("SELECT role FROM identities WHERE email = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(role, "admin");
    }

    #[tokio::test]
    async fn test_pool_against_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cores.sqlite");

        let pool = create_pool(&path, DatabaseOptions::default()).await.unwrap();
        init_schema(&pool).await.unwrap();
        seed_bootstrap_admin(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();

        assert!(path.exists());
    }
}
