use crate::identity::Actor;
use chrono::{DateTime, Utc};
use ferm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Outcome classification recorded at closure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    PartialSuccess,
    Failed,
    Contaminated,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::PartialSuccess => "partial_success",
            Outcome::Failed => "failed",
            Outcome::Contaminated => "contaminated",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Outcome::Success),
            "partial_success" => Ok(Outcome::PartialSuccess),
            "failed" => Ok(Outcome::Failed),
            "contaminated" => Ok(Outcome::Contaminated),
            other => Err(Error::validation("outcome", format!("unknown outcome '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClosure {
    pub batch_id: Uuid,
    pub final_od: f64,
    pub total_runtime_hours: f64,
    pub glycerol_depletion_hours: Option<f64>,
    pub peak_do_spike_percent: Option<f64>,
    pub cumulative_base_ml: Option<f64>,
    pub outcome: Outcome,
    pub closed_by: Actor,
    pub approved_by: Option<String>,
    pub closed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Terminal summary of a batch; at most one per batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchClosure {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub final_od: f64,
    pub total_runtime_hours: f64,
    pub glycerol_depletion_hours: Option<f64>,
    pub peak_do_spike_percent: Option<f64>,
    pub cumulative_base_ml: Option<f64>,
    pub outcome: Outcome,
    pub closed_by: Actor,
    pub approved_by: Option<String>,
    pub closed_at: DateTime<Utc>,
    pub notes: Option<String>,
}
