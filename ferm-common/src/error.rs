//! Common error types for the lab notebook engine

use thiserror::Error;
use uuid::Uuid;

/// Common result type for notebook operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every notebook operation
///
/// Every variant carries enough detail to identify the failing field or guard.
/// None of them is fatal to the engine; storage failures are propagated unchanged.
#[derive(Error, Debug)]
pub enum Error {
    /// Field-level validation failure; the caller can resubmit corrected input
    #[error("Validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// A uniqueness invariant would be violated
    #[error("Duplicate {entity}: {key}")]
    DuplicateRecord { entity: String, key: String },

    /// A state machine guard was not satisfied
    #[error("Invalid state transition for batch {batch_id} (status {status}): {guard}")]
    InvalidStateTransition {
        batch_id: Uuid,
        status: String,
        guard: String,
    },

    /// A conditionally-required field was absent
    #[error("Missing required context '{field}': {reason}")]
    MissingRequiredContext { field: String, reason: String },

    /// A concurrent transition on the same batch won the race
    #[error("Stale write: batch {batch_id} was modified concurrently")]
    StaleWrite { batch_id: Uuid },

    /// Persistence failure (wraps sqlx::Error), never retried internally
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    /// Record is past the point where it may be changed
    #[error("Immutable {entity} {id}: {reason}")]
    ImmutableRecord {
        entity: String,
        id: Uuid,
        reason: String,
    },

    /// Actor's authorization level is too low for the operation
    #[error("Unauthorized: {actor} may not {action}")]
    Unauthorized { actor: String, action: String },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MissingRequiredContext {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Error::DuplicateRecord {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Stable machine-readable code, for collaborators that map errors onto their own protocol
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::DuplicateRecord { .. } => "DUPLICATE_RECORD",
            Error::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Error::MissingRequiredContext { .. } => "MISSING_REQUIRED_CONTEXT",
            Error::StaleWrite { .. } => "STALE_WRITE",
            Error::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Error::ImmutableRecord { .. } => "IMMUTABLE_RECORD",
            Error::Unauthorized { .. } => "UNAUTHORIZED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

/// True when a sqlx error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// SQLite extended result codes for a busy or locked database
///
/// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_BUSY_RECOVERY (261),
/// SQLITE_LOCKED_SHAREDCACHE (262), SQLITE_BUSY_SNAPSHOT (517).
const LOCK_CONTENTION_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// True when SQLite reported the database busy or locked
pub fn is_lock_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| LOCK_CONTENTION_CODES.contains(&&*code)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err = Error::validation("dilution_factor", "must be >= 1");
        assert_eq!(
            err.to_string(),
            "Validation failed on 'dilution_factor': must be >= 1"
        );
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_non_database_errors_are_not_classified() {
        assert!(!is_lock_contention(&sqlx::Error::PoolTimedOut));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
