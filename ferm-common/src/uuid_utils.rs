//! UUID utilities
//!
//! Identifiers are persisted as hyphenated TEXT.

use crate::{Error, Result};
use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a stored identifier
pub fn parse(column: &str, s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::validation(column, format!("invalid id '{}': {}", s, e)))
}
