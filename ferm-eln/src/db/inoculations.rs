use super::{get_actor, get_ts, get_uuid, insert_error};
use crate::models::Inoculation;
use ferm_common::{time, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Insert an inoculation; called only inside a guard transaction
pub async fn insert(conn: &mut SqliteConnection, inoc: &Inoculation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO inoculations (
            id, batch_id, source, density, microscopy_notes, go_decision,
            performed_by, actor_level, performed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(inoc.id.to_string())
    .bind(inoc.batch_id.to_string())
    .bind(&inoc.source)
    .bind(inoc.density)
    .bind(&inoc.microscopy_notes)
    .bind(inoc.go_decision)
    .bind(&inoc.performed_by.id)
    .bind(inoc.performed_by.level.as_str())
    .bind(time::to_db(&inoc.performed_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_error(e, "inoculation", format!("batch {}", inoc.batch_id)))?;

    Ok(())
}

/// Whether the batch already has one; the guard transaction re-checks
pub async fn exists(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<bool> {
    let found: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM inoculations WHERE batch_id = ?)")
        .bind(batch_id.to_string())
        .fetch_one(&mut *conn)
        .await?;

    Ok(found != 0)
}

pub async fn for_batch(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Vec<Inoculation>> {
    let rows = sqlx::query("SELECT * FROM inoculations WHERE batch_id = ?")
        .bind(batch_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &SqliteRow) -> Result<Inoculation> {
    Ok(Inoculation {
        id: get_uuid(row, "id")?,
        batch_id: get_uuid(row, "batch_id")?,
        source: row.try_get("source")?,
        density: row.try_get("density")?,
        microscopy_notes: row.try_get("microscopy_notes")?,
        go_decision: row.try_get("go_decision")?,
        performed_by: get_actor(row, "performed_by", "actor_level")?,
        performed_at: get_ts(row, "performed_at")?,
    })
}
