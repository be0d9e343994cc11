//! Actor identity supplied by the external identity collaborator
//!
//! The engine never authenticates anyone; it receives an opaque actor id and an
//! authorization level with every request and attaches both to each accepted record.

use ferm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authorization level, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    Viewer,
    Technician,
    Engineer,
    Admin,
}

impl AuthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthLevel::Viewer => "viewer",
            AuthLevel::Technician => "technician",
            AuthLevel::Engineer => "engineer",
            AuthLevel::Admin => "admin",
        }
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(AuthLevel::Viewer),
            "technician" => Ok(AuthLevel::Technician),
            "engineer" => Ok(AuthLevel::Engineer),
            "admin" => Ok(AuthLevel::Admin),
            other => Err(Error::validation(
                "auth_level",
                format!("unknown authorization level '{}'", other),
            )),
        }
    }
}

/// Opaque actor identity plus authorization level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub level: AuthLevel,
}

impl Actor {
    pub fn new(id: impl Into<String>, level: AuthLevel) -> Self {
        Self {
            id: id.into(),
            level,
        }
    }

    /// Fail with `Unauthorized` unless the actor holds at least `min`
    pub fn require(&self, min: AuthLevel, action: &str) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::missing("actor", "every record needs an actor identity"));
        }
        if self.level < min {
            return Err(Error::Unauthorized {
                actor: format!("{} ({})", self.id, self.level),
                action: action.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(AuthLevel::Viewer < AuthLevel::Technician);
        assert!(AuthLevel::Technician < AuthLevel::Engineer);
        assert!(AuthLevel::Engineer < AuthLevel::Admin);
    }

    #[test]
    fn test_require_rejects_lower_level() {
        let tech = Actor::new("t.nguyen", AuthLevel::Technician);
        assert!(tech.require(AuthLevel::Technician, "record samples").is_ok());
        assert!(matches!(
            tech.require(AuthLevel::Engineer, "close batches"),
            Err(Error::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_require_rejects_blank_identity() {
        let anon = Actor::new("  ", AuthLevel::Admin);
        assert!(matches!(
            anon.require(AuthLevel::Viewer, "read"),
            Err(Error::MissingRequiredContext { .. })
        ));
    }

    #[test]
    fn test_parse_round_trip() {
        for level in [
            AuthLevel::Viewer,
            AuthLevel::Technician,
            AuthLevel::Engineer,
            AuthLevel::Admin,
        ] {
            assert_eq!(level.as_str().parse::<AuthLevel>().unwrap(), level);
        }
        assert!("supervisor".parse::<AuthLevel>().is_err());
    }
}
