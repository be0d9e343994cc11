//! Database initialization
//!
//! Creates the notebook database on first run and brings existing databases up to the
//! current schema. Child tables reference `batches(id)` without `ON DELETE CASCADE`:
//! removing a batch's children is an explicit step of the administrative purge.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// SQLite busy timeout; guard transactions that wait longer report a stale write
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Per-connection pragmas
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create every notebook table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_batches_table(pool).await?;
    create_media_preparations_table(pool).await?;
    create_calibrations_table(pool).await?;
    create_inoculations_table(pool).await?;
    create_samples_table(pool).await?;
    create_process_changes_table(pool).await?;
    create_failures_table(pool).await?;
    create_closures_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_batches_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            id TEXT PRIMARY KEY,
            sequence_number INTEGER NOT NULL UNIQUE CHECK (sequence_number >= 1),
            phase TEXT NOT NULL CHECK (phase IN ('A', 'B', 'C')),
            vessel_id TEXT NOT NULL,
            operator_id TEXT NOT NULL,
            operator_level TEXT NOT NULL DEFAULT 'technician',
            status TEXT NOT NULL CHECK (status IN ('setup', 'running', 'complete', 'aborted')),
            revision INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            inoculated_at TEXT,
            completed_at TEXT,
            abort_reason TEXT,
            notes TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_media_preparations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_preparations (
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batches(id),
            recipe_name TEXT NOT NULL,
            volume_l REAL NOT NULL CHECK (volume_l > 0),
            components TEXT NOT NULL,
            prepared_by TEXT NOT NULL,
            actor_level TEXT NOT NULL,
            prepared_at TEXT NOT NULL,
            sterility_verified INTEGER NOT NULL DEFAULT 0,
            sterility_verified_by TEXT,
            sterility_verified_at TEXT,
            notes TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_media_preparations_batch ON media_preparations(batch_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_calibrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS calibrations (
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batches(id),
            probe_type TEXT NOT NULL,
            buffer_low REAL,
            buffer_high REAL,
            reading_low_mv REAL,
            reading_high_mv REAL,
            reference_value REAL,
            reading_value REAL,
            response_time_s REAL,
            slope_percent REAL,
            drift REAL,
            passed INTEGER NOT NULL,
            performed_by TEXT NOT NULL,
            actor_level TEXT NOT NULL,
            performed_at TEXT NOT NULL,
            notes TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_calibrations_batch_probe ON calibrations(batch_id, probe_type, passed)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_inoculations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inoculations (
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL UNIQUE REFERENCES batches(id),
            source TEXT NOT NULL,
            density REAL NOT NULL,
            microscopy_notes TEXT,
            go_decision INTEGER NOT NULL DEFAULT 0,
            performed_by TEXT NOT NULL,
            actor_level TEXT NOT NULL,
            performed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batches(id),
            taken_at TEXT NOT NULL,
            timepoint_hours REAL NOT NULL,
            od_raw REAL NOT NULL,
            dilution_factor REAL NOT NULL CHECK (dilution_factor >= 1),
            od_corrected REAL NOT NULL,
            wet_weight_g REAL,
            dry_weight_g REAL,
            filtered_volume_ml REAL,
            dcw_g_per_l REAL,
            dcw_deviation_percent REAL,
            contamination_detected INTEGER NOT NULL DEFAULT 0,
            microscopy_notes TEXT,
            taken_by TEXT NOT NULL,
            actor_level TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_samples_batch_timepoint ON samples(batch_id, timepoint_hours)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_process_changes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS process_changes (
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batches(id),
            elapsed_hours REAL NOT NULL CHECK (elapsed_hours >= 0),
            parameter TEXT NOT NULL,
            old_value REAL NOT NULL,
            new_value REAL NOT NULL,
            justification TEXT NOT NULL,
            supervisor_approval TEXT,
            changed_by TEXT NOT NULL,
            actor_level TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_failures_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS failures (
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batches(id),
            severity INTEGER NOT NULL CHECK (severity BETWEEN 1 AND 3),
            category TEXT NOT NULL,
            description TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            root_cause TEXT,
            corrective_action TEXT,
            impact TEXT,
            reported_by TEXT NOT NULL,
            actor_level TEXT NOT NULL,
            reported_at TEXT NOT NULL,
            reviewed INTEGER NOT NULL DEFAULT 0,
            reviewed_by TEXT,
            reviewed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_closures_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS closures (
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL UNIQUE REFERENCES batches(id),
            final_od REAL NOT NULL,
            total_runtime_hours REAL NOT NULL,
            glycerol_depletion_hours REAL,
            peak_do_spike_percent REAL,
            cumulative_base_ml REAL,
            outcome TEXT NOT NULL,
            closed_by TEXT NOT NULL,
            actor_level TEXT NOT NULL,
            approved_by TEXT,
            closed_at TEXT NOT NULL,
            notes TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
