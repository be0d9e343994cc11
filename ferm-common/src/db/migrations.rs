//! Notebook schema versioning
//!
//! Version 1 is the baseline schema built by `init::create_schema`. Later schema
//! changes get a `migrate_vN` step here that upgrades v1 notebooks in place.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Schema version written by this build; bump together with a new `migrate_vN`
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Highest applied version, or 0 for a database that has never been stamped
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Stamp a fresh database with the baseline, or apply pending steps in order
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    // v1 is whatever create_schema just built
    set_schema_version(pool, 1).await?;
    info!("✓ Stamped baseline schema v1");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn create_schema_version_table(pool: &SqlitePool) {
        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_get_schema_version_no_table() {
        let pool = setup_test_db().await;
        assert_eq!(get_schema_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get_schema_version() {
        let pool = setup_test_db().await;
        create_schema_version_table(&pool).await;

        set_schema_version(&pool, 1).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_migrations_stamps_baseline_once() {
        let pool = setup_test_db().await;
        create_schema_version_table(&pool).await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_newer_schema_is_left_alone() {
        let pool = setup_test_db().await;
        create_schema_version_table(&pool).await;
        set_schema_version(&pool, CURRENT_SCHEMA_VERSION + 1).await.unwrap();

        run_migrations(&pool).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION + 1);
    }
}
