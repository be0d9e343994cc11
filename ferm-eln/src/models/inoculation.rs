use crate::identity::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInoculation {
    pub batch_id: Uuid,
    pub source: String,
    /// Inoculum OD600
    pub density: f64,
    pub microscopy_notes: Option<String>,
    /// Go/no-go decision; absent means no-go
    pub go_decision: Option<bool>,
    pub performed_by: Actor,
    pub performed_at: DateTime<Utc>,
}

/// Inoculation record; at most one per batch, its timestamp is the run's T=0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inoculation {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub source: String,
    pub density: f64,
    pub microscopy_notes: Option<String>,
    pub go_decision: bool,
    pub performed_by: Actor,
    pub performed_at: DateTime<Utc>,
}
