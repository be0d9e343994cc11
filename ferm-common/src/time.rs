//! Timestamp utilities
//!
//! Timestamps are persisted as RFC 3339 TEXT columns.

use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored timestamp
pub fn from_db(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::validation(column, format!("invalid timestamp '{}': {}", value, e)))
}

/// Parse an optional stored timestamp
pub fn from_db_opt(column: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| from_db(column, v)).transpose()
}

/// Fractional hours elapsed from `origin` to `at` (negative if `at` precedes `origin`)
pub fn hours_between(origin: &DateTime<Utc>, at: &DateTime<Utc>) -> f64 {
    (*at - *origin).num_milliseconds() as f64 / 3_600_000.0
}
