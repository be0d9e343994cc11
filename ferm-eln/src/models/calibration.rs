use crate::identity::Actor;
use chrono::{DateTime, Utc};
use ferm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Probe types calibrated before and during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeType {
    Ph,
    Do,
    Temperature,
    OffgasO2,
    OffgasCo2,
    Pressure,
}

impl ProbeType {
    pub const ALL: [ProbeType; 6] = [
        ProbeType::Ph,
        ProbeType::Do,
        ProbeType::Temperature,
        ProbeType::OffgasO2,
        ProbeType::OffgasCo2,
        ProbeType::Pressure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeType::Ph => "ph",
            ProbeType::Do => "do",
            ProbeType::Temperature => "temperature",
            ProbeType::OffgasO2 => "offgas_o2",
            ProbeType::OffgasCo2 => "offgas_co2",
            ProbeType::Pressure => "pressure",
        }
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ProbeType::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| Error::validation("probe_type", format!("unknown probe type '{}'", s)))
    }
}

/// Raw calibration readings; which fields are required depends on the probe type
///
/// - pH: two-point buffers (`buffer_low`/`buffer_high`, pH units) and millivolt readings
/// - DO / off-gas: span `reference_value`, span `reading_value` and `response_time_s`
/// - Temperature / pressure: single-point `reference_value` and `reading_value`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReadings {
    pub buffer_low: Option<f64>,
    pub buffer_high: Option<f64>,
    pub reading_low_mv: Option<f64>,
    pub reading_high_mv: Option<f64>,
    pub reference_value: Option<f64>,
    pub reading_value: Option<f64>,
    pub response_time_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCalibration {
    pub batch_id: Uuid,
    pub probe_type: ProbeType,
    pub readings: ProbeReadings,
    pub performed_by: Actor,
    pub performed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Calibration record; derived values are always recomputed from the raw readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub probe_type: ProbeType,
    pub readings: ProbeReadings,
    /// pH probes only; `None` when the buffers coincide
    pub slope_percent: Option<f64>,
    /// Reading minus reference for single-point and span probes
    pub drift: Option<f64>,
    pub passed: bool,
    pub performed_by: Actor,
    pub performed_at: DateTime<Utc>,
    pub notes: Option<String>,
}
