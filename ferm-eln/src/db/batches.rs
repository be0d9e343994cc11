//! Batch rows, guard claims and status transitions

use super::{get_actor, get_parsed, get_ts, get_ts_opt, get_uuid, insert_error};
use crate::lifecycle::{BatchAggregate, BatchStatus};
use crate::models::{Batch, ProbeType};
use chrono::{DateTime, Utc};
use ferm_common::error::is_lock_contention;
use ferm_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeSet;
use uuid::Uuid;

const BATCH_COLUMNS: &str = "id, sequence_number, phase, vessel_id, operator_id, operator_level, \
     status, revision, created_at, inoculated_at, completed_at, abort_reason, notes";

/// Timestamps and reason written alongside a status change; `None` leaves the column as is
#[derive(Debug, Clone, Default)]
pub struct StatusStamp {
    pub inoculated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub abort_reason: Option<String>,
}

/// Rows removed by an administrative purge
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PurgeCounts {
    pub samples: u64,
    pub calibrations: u64,
    pub inoculations: u64,
    pub process_changes: u64,
    pub failures: u64,
    pub closures: u64,
    pub media_preparations: u64,
}

impl PurgeCounts {
    pub fn total(&self) -> u64 {
        self.samples
            + self.calibrations
            + self.inoculations
            + self.process_changes
            + self.failures
            + self.closures
            + self.media_preparations
    }
}

pub async fn insert(conn: &mut SqliteConnection, batch: &Batch) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO batches (
            id, sequence_number, phase, vessel_id, operator_id, operator_level,
            status, revision, created_at, inoculated_at, completed_at, abort_reason, notes
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(batch.id.to_string())
    .bind(batch.sequence_number as i64)
    .bind(batch.phase.as_str())
    .bind(&batch.vessel_id)
    .bind(&batch.operator.id)
    .bind(batch.operator.level.as_str())
    .bind(batch.status.as_str())
    .bind(batch.revision)
    .bind(time::to_db(&batch.created_at))
    .bind(batch.inoculated_at.as_ref().map(time::to_db))
    .bind(batch.completed_at.as_ref().map(time::to_db))
    .bind(&batch.abort_reason)
    .bind(&batch.notes)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        insert_error(e, "batch", format!("sequence number {}", batch.sequence_number))
    })?;

    Ok(())
}

pub async fn get(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Batch> {
    let sql = format!("SELECT {} FROM batches WHERE id = ?", BATCH_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(batch_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("batch {}", batch_id)))?;

    from_row(&row)
}

/// All batches, by sequence number
pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Batch>> {
    let sql = format!("SELECT {} FROM batches ORDER BY sequence_number", BATCH_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    rows.iter().map(from_row).collect()
}

pub async fn status(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<BatchStatus> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM batches WHERE id = ?")
        .bind(batch_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    status
        .ok_or_else(|| Error::NotFound(format!("batch {}", batch_id)))?
        .parse()
}

/// Take the write lock on a batch by bumping its revision
///
/// Must be the first statement of a guard transaction: it serializes concurrent
/// transitions on the same batch before any guard input is read. A lock wait that
/// outlasts the busy timeout is reported as `StaleWrite`.
pub async fn claim(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<()> {
    let result = sqlx::query("UPDATE batches SET revision = revision + 1 WHERE id = ?")
        .bind(batch_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_lock_contention(&e) {
                Error::StaleWrite { batch_id }
            } else {
                Error::StorageUnavailable(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("batch {}", batch_id)));
    }
    Ok(())
}

/// Snapshot of everything the lifecycle guards look at
pub async fn load_aggregate(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<BatchAggregate> {
    let id = batch_id.to_string();

    let row = sqlx::query(
        r#"
        SELECT
            b.status,
            b.revision,
            (SELECT COUNT(*) FROM samples s WHERE s.batch_id = b.id) AS sample_count,
            EXISTS(SELECT 1 FROM inoculations i WHERE i.batch_id = b.id) AS has_inoculation,
            EXISTS(SELECT 1 FROM closures c WHERE c.batch_id = b.id) AS has_closure
        FROM batches b
        WHERE b.id = ?
        "#,
    )
    .bind(&id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("batch {}", batch_id)))?;

    let probes: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT probe_type FROM calibrations WHERE batch_id = ? AND passed = 1",
    )
    .bind(&id)
    .fetch_all(&mut *conn)
    .await?;

    let passing_probes = probes
        .iter()
        .map(|p| p.parse::<ProbeType>())
        .collect::<Result<BTreeSet<_>>>()?;

    let sample_count: i64 = row.try_get("sample_count")?;
    let has_inoculation: i64 = row.try_get("has_inoculation")?;
    let has_closure: i64 = row.try_get("has_closure")?;

    Ok(BatchAggregate {
        batch_id,
        status: get_parsed(&row, "status")?,
        revision: row.try_get("revision")?,
        passing_probes,
        sample_count: u32::try_from(sample_count).unwrap_or(u32::MAX),
        has_inoculation: has_inoculation != 0,
        has_closure: has_closure != 0,
    })
}

/// Compare-and-set status change against the aggregate the guard evaluated
pub async fn transition(
    conn: &mut SqliteConnection,
    aggregate: &BatchAggregate,
    next: BatchStatus,
    stamp: &StatusStamp,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE batches SET
            status = ?,
            inoculated_at = COALESCE(?, inoculated_at),
            completed_at = COALESCE(?, completed_at),
            abort_reason = COALESCE(?, abort_reason)
        WHERE id = ? AND status = ? AND revision = ?
        "#,
    )
    .bind(next.as_str())
    .bind(stamp.inoculated_at.as_ref().map(time::to_db))
    .bind(stamp.completed_at.as_ref().map(time::to_db))
    .bind(&stamp.abort_reason)
    .bind(aggregate.batch_id.to_string())
    .bind(aggregate.status.as_str())
    .bind(aggregate.revision)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::StaleWrite {
            batch_id: aggregate.batch_id,
        });
    }
    Ok(())
}

/// Delete a batch and every child record it owns
pub async fn purge(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<PurgeCounts> {
    let id = batch_id.to_string();

    // Children first; foreign keys have no cascade
    let mut counts = PurgeCounts::default();
    for (table, slot) in [
        ("samples", &mut counts.samples),
        ("calibrations", &mut counts.calibrations),
        ("inoculations", &mut counts.inoculations),
        ("process_changes", &mut counts.process_changes),
        ("failures", &mut counts.failures),
        ("closures", &mut counts.closures),
        ("media_preparations", &mut counts.media_preparations),
    ] {
        let sql = format!("DELETE FROM {} WHERE batch_id = ?", table);
        *slot = sqlx::query(&sql)
            .bind(&id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }

    let removed = sqlx::query("DELETE FROM batches WHERE id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(Error::NotFound(format!("batch {}", batch_id)));
    }
    Ok(counts)
}

fn from_row(row: &SqliteRow) -> Result<Batch> {
    let sequence_number: i64 = row.try_get("sequence_number")?;

    Ok(Batch {
        id: get_uuid(row, "id")?,
        sequence_number: u32::try_from(sequence_number).map_err(|_| {
            Error::validation("sequence_number", format!("out of range: {}", sequence_number))
        })?,
        phase: get_parsed(row, "phase")?,
        vessel_id: row.try_get("vessel_id")?,
        operator: get_actor(row, "operator_id", "operator_level")?,
        status: get_parsed(row, "status")?,
        revision: row.try_get("revision")?,
        created_at: get_ts(row, "created_at")?,
        inoculated_at: get_ts_opt(row, "inoculated_at")?,
        completed_at: get_ts_opt(row, "completed_at")?,
        abort_reason: row.try_get("abort_reason")?,
        notes: row.try_get("notes")?,
    })
}
