use super::{get_actor, get_parsed, get_ts, get_uuid, insert_error};
use crate::models::BatchClosure;
use ferm_common::{time, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Insert a closure; called only inside a guard transaction
pub async fn insert(conn: &mut SqliteConnection, closure: &BatchClosure) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO closures (
            id, batch_id, final_od, total_runtime_hours, glycerol_depletion_hours,
            peak_do_spike_percent, cumulative_base_ml, outcome,
            closed_by, actor_level, approved_by, closed_at, notes
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(closure.id.to_string())
    .bind(closure.batch_id.to_string())
    .bind(closure.final_od)
    .bind(closure.total_runtime_hours)
    .bind(closure.glycerol_depletion_hours)
    .bind(closure.peak_do_spike_percent)
    .bind(closure.cumulative_base_ml)
    .bind(closure.outcome.as_str())
    .bind(&closure.closed_by.id)
    .bind(closure.closed_by.level.as_str())
    .bind(&closure.approved_by)
    .bind(time::to_db(&closure.closed_at))
    .bind(&closure.notes)
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_error(e, "closure", format!("batch {}", closure.batch_id)))?;

    Ok(())
}

/// Whether the batch already has one; the guard transaction re-checks
pub async fn exists(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<bool> {
    let found: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM closures WHERE batch_id = ?)")
        .bind(batch_id.to_string())
        .fetch_one(&mut *conn)
        .await?;

    Ok(found != 0)
}

pub async fn for_batch(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Vec<BatchClosure>> {
    let rows = sqlx::query("SELECT * FROM closures WHERE batch_id = ?")
        .bind(batch_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &SqliteRow) -> Result<BatchClosure> {
    Ok(BatchClosure {
        id: get_uuid(row, "id")?,
        batch_id: get_uuid(row, "batch_id")?,
        final_od: row.try_get("final_od")?,
        total_runtime_hours: row.try_get("total_runtime_hours")?,
        glycerol_depletion_hours: row.try_get("glycerol_depletion_hours")?,
        peak_do_spike_percent: row.try_get("peak_do_spike_percent")?,
        cumulative_base_ml: row.try_get("cumulative_base_ml")?,
        outcome: get_parsed(row, "outcome")?,
        closed_by: get_actor(row, "closed_by", "actor_level")?,
        approved_by: row.try_get("approved_by")?,
        closed_at: get_ts(row, "closed_at")?,
        notes: row.try_get("notes")?,
    })
}
