use crate::identity::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSample {
    pub batch_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub od_raw: f64,
    pub dilution_factor: f64,
    pub wet_weight_g: Option<f64>,
    pub dry_weight_g: Option<f64>,
    pub filtered_volume_ml: Option<f64>,
    #[serde(default)]
    pub contamination_detected: bool,
    pub microscopy_notes: Option<String>,
    pub taken_by: Actor,
}

/// Periodic sample with derived density and biomass values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub taken_at: DateTime<Utc>,
    /// Hours since inoculation; assigned when the sample is accepted
    pub timepoint_hours: Option<f64>,
    pub od_raw: f64,
    pub dilution_factor: f64,
    pub od_corrected: f64,
    pub wet_weight_g: Option<f64>,
    pub dry_weight_g: Option<f64>,
    pub filtered_volume_ml: Option<f64>,
    pub dcw_g_per_l: Option<f64>,
    /// Measured DCW against the OD-based estimate, percent
    pub dcw_deviation_percent: Option<f64>,
    pub contamination_detected: bool,
    pub microscopy_notes: Option<String>,
    pub taken_by: Actor,
}
