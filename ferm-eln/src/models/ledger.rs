use crate::identity::Actor;
use chrono::{DateTime, Utc};
use ferm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Operator-initiated parameter change during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProcessChange {
    pub batch_id: Uuid,
    pub elapsed_hours: f64,
    pub parameter: String,
    pub old_value: f64,
    pub new_value: f64,
    pub justification: String,
    pub supervisor_approval: Option<String>,
    pub changed_by: Actor,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only process change entry; never updated after insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessChange {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub elapsed_hours: f64,
    pub parameter: String,
    pub old_value: f64,
    pub new_value: f64,
    pub justification: String,
    pub supervisor_approval: Option<String>,
    pub changed_by: Actor,
    pub recorded_at: DateTime<Utc>,
}

/// Deviation severity; `Critical` aborts the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    Minor = 1,
    Major = 2,
    Critical = 3,
}

impl TryFrom<u8> for Severity {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            1 => Ok(Severity::Minor),
            2 => Ok(Severity::Major),
            3 => Ok(Severity::Critical),
            other => Err(Error::validation(
                "severity",
                format!("must be 1, 2 or 3, got {}", other),
            )),
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        severity as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Contamination,
    Equipment,
    Sensor,
    Process,
    Operator,
    Utility,
    Other,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Contamination => "contamination",
            FailureCategory::Equipment => "equipment",
            FailureCategory::Sensor => "sensor",
            FailureCategory::Process => "process",
            FailureCategory::Operator => "operator",
            FailureCategory::Utility => "utility",
            FailureCategory::Other => "other",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contamination" => Ok(FailureCategory::Contamination),
            "equipment" => Ok(FailureCategory::Equipment),
            "sensor" => Ok(FailureCategory::Sensor),
            "process" => Ok(FailureCategory::Process),
            "operator" => Ok(FailureCategory::Operator),
            "utility" => Ok(FailureCategory::Utility),
            "other" => Ok(FailureCategory::Other),
            other => Err(Error::validation(
                "category",
                format!("unknown failure category '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFailure {
    pub batch_id: Uuid,
    /// Raw severity as submitted; validated into [`Severity`]
    pub severity: u8,
    pub category: FailureCategory,
    pub description: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub root_cause: Option<String>,
    pub corrective_action: Option<String>,
    pub impact: Option<String>,
    pub reported_by: Actor,
    pub reported_at: DateTime<Utc>,
}

/// Deviation entry; content freezes once reviewed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub severity: Severity,
    pub category: FailureCategory,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub root_cause: Option<String>,
    pub corrective_action: Option<String>,
    pub impact: Option<String>,
    pub reported_by: Actor,
    pub reported_at: DateTime<Utc>,
    pub reviewed: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Investigation results filled in before review; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureAmendment {
    pub ended_at: Option<DateTime<Utc>>,
    pub root_cause: Option<String>,
    pub corrective_action: Option<String>,
    pub impact: Option<String>,
}
