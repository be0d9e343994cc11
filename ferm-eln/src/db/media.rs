use super::{get_actor, get_ts, get_ts_opt, get_uuid, reject_child, status_list, LIVE_STATUSES};
use crate::models::{MediaComponent, MediaPreparation};
use chrono::{DateTime, Utc};
use ferm_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Insert a media preparation if its batch is still live
pub async fn insert(conn: &mut SqliteConnection, media: &MediaPreparation) -> Result<()> {
    let components = serde_json::to_string(&media.components)
        .map_err(|e| Error::validation("components", format!("cannot serialize: {}", e)))?;

    let sql = format!(
        r#"
        INSERT INTO media_preparations (
            id, batch_id, recipe_name, volume_l, components,
            prepared_by, actor_level, prepared_at,
            sterility_verified, sterility_verified_by, sterility_verified_at, notes
        )
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM batches WHERE id = ? AND status IN ({}))
        "#,
        status_list(LIVE_STATUSES)
    );

    let result = sqlx::query(&sql)
        .bind(media.id.to_string())
        .bind(media.batch_id.to_string())
        .bind(&media.recipe_name)
        .bind(media.volume_l)
        .bind(&components)
        .bind(&media.prepared_by.id)
        .bind(media.prepared_by.level.as_str())
        .bind(time::to_db(&media.prepared_at))
        .bind(media.sterility_verified)
        .bind(&media.sterility_verified_by)
        .bind(media.sterility_verified_at.as_ref().map(time::to_db))
        .bind(&media.notes)
        .bind(media.batch_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(reject_child(conn, media.batch_id, "media preparation", LIVE_STATUSES).await);
    }
    Ok(())
}

/// Id of the batch's sterility-verified preparation, if any
pub async fn verified_id(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Option<Uuid>> {
    let id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM media_preparations WHERE batch_id = ? AND sterility_verified = 1 LIMIT 1",
    )
    .bind(batch_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    id.map(|s| ferm_common::uuid_utils::parse("id", &s)).transpose()
}

/// Drop preparations that were never verified; they are superseded by a new one
pub async fn delete_unverified(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<u64> {
    let result =
        sqlx::query("DELETE FROM media_preparations WHERE batch_id = ? AND sterility_verified = 0")
            .bind(batch_id.to_string())
            .execute(&mut *conn)
            .await?;

    Ok(result.rows_affected())
}

pub async fn get(conn: &mut SqliteConnection, media_id: Uuid) -> Result<MediaPreparation> {
    let row = sqlx::query("SELECT * FROM media_preparations WHERE id = ?")
        .bind(media_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("media preparation {}", media_id)))?;

    from_row(&row)
}

/// One-way sterility sign-off on a live batch
///
/// Returns false when the row was already verified or its batch is terminal.
pub async fn mark_sterile(
    conn: &mut SqliteConnection,
    media_id: Uuid,
    verified_by: &str,
    verified_at: &DateTime<Utc>,
) -> Result<bool> {
    let sql = format!(
        r#"
        UPDATE media_preparations
        SET sterility_verified = 1, sterility_verified_by = ?, sterility_verified_at = ?
        WHERE id = ? AND sterility_verified = 0
          AND batch_id IN (SELECT id FROM batches WHERE status IN ({}))
        "#,
        status_list(LIVE_STATUSES)
    );

    let result = sqlx::query(&sql)
        .bind(verified_by)
        .bind(time::to_db(verified_at))
        .bind(media_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn for_batch(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Vec<MediaPreparation>> {
    let rows = sqlx::query(
        "SELECT * FROM media_preparations WHERE batch_id = ? ORDER BY prepared_at, rowid",
    )
    .bind(batch_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &SqliteRow) -> Result<MediaPreparation> {
    let components: String = row.try_get("components")?;
    let components: Vec<MediaComponent> = serde_json::from_str(&components)
        .map_err(|e| Error::validation("components", format!("corrupt component list: {}", e)))?;

    Ok(MediaPreparation {
        id: get_uuid(row, "id")?,
        batch_id: get_uuid(row, "batch_id")?,
        recipe_name: row.try_get("recipe_name")?,
        volume_l: row.try_get("volume_l")?,
        components,
        prepared_by: get_actor(row, "prepared_by", "actor_level")?,
        prepared_at: get_ts(row, "prepared_at")?,
        sterility_verified: row.try_get("sterility_verified")?,
        sterility_verified_by: row.try_get("sterility_verified_by")?,
        sterility_verified_at: get_ts_opt(row, "sterility_verified_at")?,
        notes: row.try_get("notes")?,
    })
}
