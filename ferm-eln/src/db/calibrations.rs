use super::{get_actor, get_parsed, get_ts, get_uuid, reject_child, status_list, LIVE_STATUSES};
use crate::models::{Calibration, ProbeReadings};
use ferm_common::{time, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Insert a calibration if its batch is still live
pub async fn insert(conn: &mut SqliteConnection, cal: &Calibration) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO calibrations (
            id, batch_id, probe_type,
            buffer_low, buffer_high, reading_low_mv, reading_high_mv,
            reference_value, reading_value, response_time_s,
            slope_percent, drift, passed,
            performed_by, actor_level, performed_at, notes
        )
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM batches WHERE id = ? AND status IN ({}))
        "#,
        status_list(LIVE_STATUSES)
    );

    let r = &cal.readings;
    let result = sqlx::query(&sql)
        .bind(cal.id.to_string())
        .bind(cal.batch_id.to_string())
        .bind(cal.probe_type.as_str())
        .bind(r.buffer_low)
        .bind(r.buffer_high)
        .bind(r.reading_low_mv)
        .bind(r.reading_high_mv)
        .bind(r.reference_value)
        .bind(r.reading_value)
        .bind(r.response_time_s)
        .bind(cal.slope_percent)
        .bind(cal.drift)
        .bind(cal.passed)
        .bind(&cal.performed_by.id)
        .bind(cal.performed_by.level.as_str())
        .bind(time::to_db(&cal.performed_at))
        .bind(&cal.notes)
        .bind(cal.batch_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(reject_child(conn, cal.batch_id, "calibration", LIVE_STATUSES).await);
    }
    Ok(())
}

/// Calibrations for a batch, oldest first
pub async fn for_batch(conn: &mut SqliteConnection, batch_id: Uuid) -> Result<Vec<Calibration>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM calibrations
        WHERE batch_id = ?
        ORDER BY performed_at, rowid
        "#,
    )
    .bind(batch_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &SqliteRow) -> Result<Calibration> {
    Ok(Calibration {
        id: get_uuid(row, "id")?,
        batch_id: get_uuid(row, "batch_id")?,
        probe_type: get_parsed(row, "probe_type")?,
        readings: ProbeReadings {
            buffer_low: row.try_get("buffer_low")?,
            buffer_high: row.try_get("buffer_high")?,
            reading_low_mv: row.try_get("reading_low_mv")?,
            reading_high_mv: row.try_get("reading_high_mv")?,
            reference_value: row.try_get("reference_value")?,
            reading_value: row.try_get("reading_value")?,
            response_time_s: row.try_get("response_time_s")?,
        },
        slope_percent: row.try_get("slope_percent")?,
        drift: row.try_get("drift")?,
        passed: row.try_get("passed")?,
        performed_by: get_actor(row, "performed_by", "actor_level")?,
        performed_at: get_ts(row, "performed_at")?,
        notes: row.try_get("notes")?,
    })
}
