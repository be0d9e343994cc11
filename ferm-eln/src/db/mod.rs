//! Notebook persistence
//!
//! One module per table. Functions take `&mut SqliteConnection` so the same code runs
//! on a pooled connection or inside a guard transaction (`&mut *tx`).
//!
//! Child records are written with a single conditional statement,
//! `INSERT ... SELECT ... WHERE EXISTS (batch in an allowed status)`, so a batch that
//! turns terminal concurrently can never gain new children.

pub mod batches;
pub mod calibrations;
pub mod closures;
pub mod inoculations;
pub mod ledger;
pub mod media;
pub mod samples;

use crate::identity::{Actor, AuthLevel};
use crate::lifecycle::BatchStatus;
use chrono::{DateTime, Utc};
use ferm_common::error::is_unique_violation;
use ferm_common::{time, uuid_utils, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Statuses in which a batch accepts new calibrations, media and failures
pub const LIVE_STATUSES: &[BatchStatus] = &[BatchStatus::Setup, BatchStatus::Running];

/// Statuses in which a batch accepts samples and process changes
pub const RUNNING_ONLY: &[BatchStatus] = &[BatchStatus::Running];

/// `'setup', 'running'` for use in `status IN (...)`
pub(crate) fn status_list(allowed: &[BatchStatus]) -> String {
    allowed
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Explain why a conditional child insert wrote nothing
pub(crate) async fn reject_child(
    conn: &mut SqliteConnection,
    batch_id: Uuid,
    entity: &str,
    allowed: &[BatchStatus],
) -> Error {
    match batches::status(conn, batch_id).await {
        Ok(status) => Error::InvalidStateTransition {
            batch_id,
            status: status.to_string(),
            guard: format!(
                "{} records require batch status {}",
                entity,
                allowed
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" or ")
            ),
        },
        Err(e) => e,
    }
}

/// Map an insert failure, turning unique violations into `DuplicateRecord`
pub(crate) fn insert_error(err: sqlx::Error, entity: &str, key: impl Into<String>) -> Error {
    if is_unique_violation(&err) {
        Error::duplicate(entity, key)
    } else {
        Error::StorageUnavailable(err)
    }
}

pub(crate) fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.try_get(column)?;
    uuid_utils::parse(column, &value)
}

pub(crate) fn get_ts(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row.try_get(column)?;
    time::from_db(column, &value)
}

pub(crate) fn get_ts_opt(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.try_get(column)?;
    time::from_db_opt(column, value.as_deref())
}

/// Actor stored as `<id_column>` plus `<level_column>`
pub(crate) fn get_actor(row: &SqliteRow, id_column: &str, level_column: &str) -> Result<Actor> {
    let id: String = row.try_get(id_column)?;
    let level: String = row.try_get(level_column)?;
    Ok(Actor::new(id, level.parse::<AuthLevel>()?))
}

pub(crate) fn get_parsed<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    let value: String = row.try_get(column)?;
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_list() {
        assert_eq!(status_list(LIVE_STATUSES), "'setup', 'running'");
        assert_eq!(status_list(RUNNING_ONLY), "'running'");
    }

    #[test]
    fn test_insert_error_passes_storage_errors_through() {
        let err = insert_error(sqlx::Error::RowNotFound, "sample", "x");
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }
}
