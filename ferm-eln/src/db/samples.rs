use super::{get_actor, get_ts, get_uuid, reject_child, status_list, RUNNING_ONLY};
use crate::models::Sample;
use ferm_common::{time, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Insert a sample if its batch is running
///
/// The sample must already carry its timepoint.
pub async fn insert(conn: &mut SqliteConnection, sample: &Sample) -> Result<()> {
    let timepoint = sample
        .timepoint_hours
        .ok_or_else(|| Error::missing("timepoint_hours", "sample has not been placed on the run timeline"))?;

    let sql = format!(
        r#"
        INSERT INTO samples (
            id, batch_id, taken_at, timepoint_hours,
            od_raw, dilution_factor, od_corrected,
            wet_weight_g, dry_weight_g, filtered_volume_ml, dcw_g_per_l, dcw_deviation_percent,
            contamination_detected, microscopy_notes, taken_by, actor_level
        )
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM batches WHERE id = ? AND status IN ({}))
        "#,
        status_list(RUNNING_ONLY)
    );

    let result = sqlx::query(&sql)
        .bind(sample.id.to_string())
        .bind(sample.batch_id.to_string())
        .bind(time::to_db(&sample.taken_at))
        .bind(timepoint)
        .bind(sample.od_raw)
        .bind(sample.dilution_factor)
        .bind(sample.od_corrected)
        .bind(sample.wet_weight_g)
        .bind(sample.dry_weight_g)
        .bind(sample.filtered_volume_ml)
        .bind(sample.dcw_g_per_l)
        .bind(sample.dcw_deviation_percent)
        .bind(sample.contamination_detected)
        .bind(&sample.microscopy_notes)
        .bind(&sample.taken_by.id)
        .bind(sample.taken_by.level.as_str())
        .bind(sample.batch_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(reject_child(conn, sample.batch_id, "sample", RUNNING_ONLY).await);
    }
    Ok(())
}

/// Samples for a batch in run order
pub async fn for_batch(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Vec<Sample>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM samples
        WHERE batch_id = ?
        ORDER BY timepoint_hours, rowid
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &SqliteRow) -> Result<Sample> {
    Ok(Sample {
        id: get_uuid(row, "id")?,
        batch_id: get_uuid(row, "batch_id")?,
        taken_at: get_ts(row, "taken_at")?,
        timepoint_hours: Some(row.try_get("timepoint_hours")?),
        od_raw: row.try_get("od_raw")?,
        dilution_factor: row.try_get("dilution_factor")?,
        od_corrected: row.try_get("od_corrected")?,
        wet_weight_g: row.try_get("wet_weight_g")?,
        dry_weight_g: row.try_get("dry_weight_g")?,
        filtered_volume_ml: row.try_get("filtered_volume_ml")?,
        dcw_g_per_l: row.try_get("dcw_g_per_l")?,
        dcw_deviation_percent: row.try_get("dcw_deviation_percent")?,
        contamination_detected: row.try_get("contamination_detected")?,
        microscopy_notes: row.try_get("microscopy_notes")?,
        taken_by: get_actor(row, "taken_by", "actor_level")?,
    })
}
