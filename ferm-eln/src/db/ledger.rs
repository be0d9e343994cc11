//! Process change and failure rows
//!
//! Process changes are insert-only. Failure updates are conditional on `reviewed = 0`;
//! a reviewed row is never written again.

use super::{get_actor, get_ts, get_ts_opt, get_uuid, reject_child, status_list};
use crate::lifecycle::BatchStatus;
use crate::models::{Failure, FailureCategory, ProcessChange, Severity};
use ferm_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

pub async fn insert_process_change(
    conn: &mut SqliteConnection,
    change: &ProcessChange,
    allowed: &[BatchStatus],
) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO process_changes (
            id, batch_id, elapsed_hours, parameter, old_value, new_value,
            justification, supervisor_approval, changed_by, actor_level, recorded_at
        )
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM batches WHERE id = ? AND status IN ({}))
        "#,
        status_list(allowed)
    );

    let result = sqlx::query(&sql)
        .bind(change.id.to_string())
        .bind(change.batch_id.to_string())
        .bind(change.elapsed_hours)
        .bind(&change.parameter)
        .bind(change.old_value)
        .bind(change.new_value)
        .bind(&change.justification)
        .bind(&change.supervisor_approval)
        .bind(&change.changed_by.id)
        .bind(change.changed_by.level.as_str())
        .bind(time::to_db(&change.recorded_at))
        .bind(change.batch_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(reject_child(conn, change.batch_id, "process change", allowed).await);
    }
    Ok(())
}

pub async fn process_changes_for_batch(
    conn: &mut SqliteConnection,
    batch_id: Uuid,
) -> Result<Vec<ProcessChange>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM process_changes
        WHERE batch_id = ?
        ORDER BY elapsed_hours, recorded_at, rowid
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(process_change_from_row).collect()
}

/// Insert a failure if its batch is in one of `allowed`
pub async fn insert_failure(
    conn: &mut SqliteConnection,
    failure: &Failure,
    allowed: &[BatchStatus],
) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO failures (
            id, batch_id, severity, category, description, started_at, ended_at,
            root_cause, corrective_action, impact,
            reported_by, actor_level, reported_at, reviewed, reviewed_by, reviewed_at
        )
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM batches WHERE id = ? AND status IN ({}))
        "#,
        status_list(allowed)
    );

    let result = sqlx::query(&sql)
        .bind(failure.id.to_string())
        .bind(failure.batch_id.to_string())
        .bind(u8::from(failure.severity) as i64)
        .bind(failure.category.as_str())
        .bind(&failure.description)
        .bind(time::to_db(&failure.started_at))
        .bind(failure.ended_at.as_ref().map(time::to_db))
        .bind(&failure.root_cause)
        .bind(&failure.corrective_action)
        .bind(&failure.impact)
        .bind(&failure.reported_by.id)
        .bind(failure.reported_by.level.as_str())
        .bind(time::to_db(&failure.reported_at))
        .bind(failure.reviewed)
        .bind(&failure.reviewed_by)
        .bind(failure.reviewed_at.as_ref().map(time::to_db))
        .bind(failure.batch_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(reject_child(conn, failure.batch_id, "failure", allowed).await);
    }
    Ok(())
}

pub async fn get_failure(conn: &mut SqliteConnection, failure_id: Uuid) -> Result<Failure> {
    let row = sqlx::query("SELECT * FROM failures WHERE id = ?")
        .bind(failure_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("failure {}", failure_id)))?;

    failure_from_row(&row)
}

/// Write the mutable columns of an unreviewed failure
///
/// With `allowed`, the write also requires the owning batch to be in one of those
/// statuses. Returns false when nothing was written.
pub async fn update_unreviewed_failure(
    conn: &mut SqliteConnection,
    failure: &Failure,
    allowed: Option<&[BatchStatus]>,
) -> Result<bool> {
    let batch_condition = match allowed {
        Some(statuses) => format!(
            "AND batch_id IN (SELECT id FROM batches WHERE status IN ({}))",
            status_list(statuses)
        ),
        None => String::new(),
    };
    let sql = format!(
        r#"
        UPDATE failures SET
            ended_at = ?,
            root_cause = ?,
            corrective_action = ?,
            impact = ?,
            reviewed = ?,
            reviewed_by = ?,
            reviewed_at = ?
        WHERE id = ? AND reviewed = 0 {}
        "#,
        batch_condition
    );

    let result = sqlx::query(&sql)
        .bind(failure.ended_at.as_ref().map(time::to_db))
        .bind(&failure.root_cause)
        .bind(&failure.corrective_action)
        .bind(&failure.impact)
        .bind(failure.reviewed)
        .bind(&failure.reviewed_by)
        .bind(failure.reviewed_at.as_ref().map(time::to_db))
        .bind(failure.id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn failures_for_batch(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Vec<Failure>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM failures
        WHERE batch_id = ?
        ORDER BY started_at, rowid
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(failure_from_row).collect()
}

fn process_change_from_row(row: &SqliteRow) -> Result<ProcessChange> {
    Ok(ProcessChange {
        id: get_uuid(row, "id")?,
        batch_id: get_uuid(row, "batch_id")?,
        elapsed_hours: row.try_get("elapsed_hours")?,
        parameter: row.try_get("parameter")?,
        old_value: row.try_get("old_value")?,
        new_value: row.try_get("new_value")?,
        justification: row.try_get("justification")?,
        supervisor_approval: row.try_get("supervisor_approval")?,
        changed_by: get_actor(row, "changed_by", "actor_level")?,
        recorded_at: get_ts(row, "recorded_at")?,
    })
}

fn failure_from_row(row: &SqliteRow) -> Result<Failure> {
    let severity: i64 = row.try_get("severity")?;
    let severity = u8::try_from(severity)
        .map_err(|_| Error::validation("severity", format!("out of range: {}", severity)))
        .and_then(Severity::try_from)?;
    let category: String = row.try_get("category")?;

    Ok(Failure {
        id: get_uuid(row, "id")?,
        batch_id: get_uuid(row, "batch_id")?,
        severity,
        category: category.parse::<FailureCategory>()?,
        description: row.try_get("description")?,
        started_at: get_ts(row, "started_at")?,
        ended_at: get_ts_opt(row, "ended_at")?,
        root_cause: row.try_get("root_cause")?,
        corrective_action: row.try_get("corrective_action")?,
        impact: row.try_get("impact")?,
        reported_by: get_actor(row, "reported_by", "actor_level")?,
        reported_at: get_ts(row, "reported_at")?,
        reviewed: row.try_get("reviewed")?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: get_ts_opt(row, "reviewed_at")?,
    })
}
