use crate::identity::Actor;
use crate::lifecycle::BatchStatus;
use chrono::{DateTime, Utc};
use ferm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Campaign phase a batch belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::A => "A",
            Phase::B => "B",
            Phase::C => "C",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Phase::A),
            "B" => Ok(Phase::B),
            "C" => Ok(Phase::C),
            other => Err(Error::validation("phase", format!("unknown phase '{}'", other))),
        }
    }
}

/// Batch setup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub sequence_number: u32,
    pub phase: Phase,
    pub vessel_id: String,
    pub operator: Actor,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A fermentation batch; status changes only through the lifecycle state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub sequence_number: u32,
    pub phase: Phase,
    pub vessel_id: String,
    pub operator: Actor,
    pub status: BatchStatus,
    /// Bumped by every guarded transition; optimistic concurrency stamp
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    /// Relative-time origin (T=0)
    pub inoculated_at: Option<DateTime<Utc>>,
    /// Set when the batch reaches Complete or Aborted
    pub completed_at: Option<DateTime<Utc>>,
    pub abort_reason: Option<String>,
    pub notes: Option<String>,
}
