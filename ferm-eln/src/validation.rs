//! Record validator
//!
//! Every input type runs a fixed, ordered list of checks; the first failing check is
//! the reported error. Derived values (corrected OD, DCW, calibration slope) are
//! computed here, synchronously, so a record is complete before it reaches storage.
//!
//! Checks that need the store (uniqueness, batch status, sample counts) belong to the
//! lifecycle guards and run at accept time.

use crate::calc;
use crate::calibration;
use crate::identity::AuthLevel;
use crate::models::*;
use ferm_common::{uuid_utils, Error, Result, Thresholds};
use tracing::warn;

/// Pure validation and derivation step shared by every notebook record type
pub trait RecordInput {
    type Record;

    fn validate_and_compute(self, thresholds: &Thresholds) -> Result<Self::Record>;
}

impl RecordInput for NewBatch {
    type Record = Batch;

    fn validate_and_compute(self, thresholds: &Thresholds) -> Result<Batch> {
        self.operator.require(AuthLevel::Technician, "set up batches")?;
        if self.sequence_number < 1 || self.sequence_number > thresholds.max_sequence_number {
            return Err(Error::validation(
                "sequence_number",
                format!(
                    "must be within 1..={}, got {}",
                    thresholds.max_sequence_number, self.sequence_number
                ),
            ));
        }
        require_text("vessel_id", &self.vessel_id)?;

        Ok(Batch {
            id: uuid_utils::generate(),
            sequence_number: self.sequence_number,
            phase: self.phase,
            vessel_id: self.vessel_id.trim().to_string(),
            operator: self.operator,
            status: crate::lifecycle::BatchStatus::Setup,
            revision: 0,
            created_at: self.created_at,
            inoculated_at: None,
            completed_at: None,
            abort_reason: None,
            notes: non_empty(self.notes),
        })
    }
}

impl RecordInput for NewMediaPreparation {
    type Record = MediaPreparation;

    fn validate_and_compute(self, _thresholds: &Thresholds) -> Result<MediaPreparation> {
        self.prepared_by.require(AuthLevel::Technician, "prepare media")?;
        require_text("recipe_name", &self.recipe_name)?;
        require_positive("volume_l", self.volume_l)?;
        if self.components.is_empty() {
            return Err(Error::validation("components", "recipe has no components"));
        }
        for component in &self.components {
            require_text("components.name", &component.name)?;
            require_positive(&format!("components.{}.amount", component.name), component.amount)?;
        }

        Ok(MediaPreparation {
            id: uuid_utils::generate(),
            batch_id: self.batch_id,
            recipe_name: self.recipe_name.trim().to_string(),
            volume_l: self.volume_l,
            components: self.components,
            prepared_by: self.prepared_by,
            prepared_at: self.prepared_at,
            sterility_verified: false,
            sterility_verified_by: None,
            sterility_verified_at: None,
            notes: non_empty(self.notes),
        })
    }
}

impl RecordInput for NewCalibration {
    type Record = Calibration;

    fn validate_and_compute(self, thresholds: &Thresholds) -> Result<Calibration> {
        self.performed_by.require(AuthLevel::Technician, "record calibrations")?;
        let verdict = calibration::assess(self.probe_type, &self.readings, thresholds)?;

        Ok(Calibration {
            id: uuid_utils::generate(),
            batch_id: self.batch_id,
            probe_type: self.probe_type,
            readings: self.readings,
            slope_percent: verdict.slope_percent,
            drift: verdict.drift,
            passed: verdict.passed,
            performed_by: self.performed_by,
            performed_at: self.performed_at,
            notes: non_empty(self.notes),
        })
    }
}

impl RecordInput for NewInoculation {
    type Record = Inoculation;

    fn validate_and_compute(self, thresholds: &Thresholds) -> Result<Inoculation> {
        self.performed_by.require(AuthLevel::Technician, "inoculate batches")?;
        require_text("source", &self.source)?;
        require_finite("density", self.density)?;
        if self.density < thresholds.inoculum_density_floor {
            return Err(Error::validation(
                "density",
                format!(
                    "inoculum density {} is below the floor of {}",
                    self.density, thresholds.inoculum_density_floor
                ),
            ));
        }

        Ok(Inoculation {
            id: uuid_utils::generate(),
            batch_id: self.batch_id,
            source: self.source.trim().to_string(),
            density: self.density,
            microscopy_notes: non_empty(self.microscopy_notes),
            go_decision: self.go_decision.unwrap_or(false),
            performed_by: self.performed_by,
            performed_at: self.performed_at,
        })
    }
}

impl RecordInput for NewSample {
    type Record = Sample;

    fn validate_and_compute(self, thresholds: &Thresholds) -> Result<Sample> {
        self.taken_by.require(AuthLevel::Technician, "record samples")?;
        let od_corrected = calc::corrected_density(self.od_raw, self.dilution_factor)?;

        let microscopy_notes = non_empty(self.microscopy_notes);
        if self.contamination_detected && microscopy_notes.is_none() {
            return Err(Error::missing(
                "microscopy_notes",
                "contamination was flagged, describe what microscopy showed",
            ));
        }

        let dcw_g_per_l = calc::dry_cell_weight_g_per_l(
            self.wet_weight_g,
            self.dry_weight_g,
            self.filtered_volume_ml,
        )?;

        let dcw_deviation_percent = dcw_g_per_l.and_then(|measured| {
            let estimate = calc::dcw_estimate_from_density(od_corrected, thresholds.dcw_per_od_factor);
            calc::percent_deviation(measured, estimate)
        });
        if let Some(deviation) = dcw_deviation_percent {
            if deviation.abs() > thresholds.dcw_cross_check_tolerance_percent {
                warn!(
                    batch_id = %self.batch_id,
                    od_corrected,
                    dcw_g_per_l = ?dcw_g_per_l,
                    deviation_percent = deviation,
                    "Measured DCW disagrees with OD-based estimate"
                );
            }
        }

        Ok(Sample {
            id: uuid_utils::generate(),
            batch_id: self.batch_id,
            taken_at: self.taken_at,
            timepoint_hours: None,
            od_raw: self.od_raw,
            dilution_factor: self.dilution_factor,
            od_corrected,
            wet_weight_g: self.wet_weight_g,
            dry_weight_g: self.dry_weight_g,
            filtered_volume_ml: self.filtered_volume_ml,
            dcw_g_per_l,
            dcw_deviation_percent,
            contamination_detected: self.contamination_detected,
            microscopy_notes,
            taken_by: self.taken_by,
        })
    }
}

impl RecordInput for NewProcessChange {
    type Record = ProcessChange;

    fn validate_and_compute(self, _thresholds: &Thresholds) -> Result<ProcessChange> {
        self.changed_by.require(AuthLevel::Technician, "change process parameters")?;
        require_text("parameter", &self.parameter)?;
        require_finite("elapsed_hours", self.elapsed_hours)?;
        if self.elapsed_hours < 0.0 {
            return Err(Error::validation(
                "elapsed_hours",
                format!("must be >= 0, got {}", self.elapsed_hours),
            ));
        }
        require_finite("old_value", self.old_value)?;
        require_finite("new_value", self.new_value)?;
        if self.old_value == self.new_value {
            return Err(Error::validation(
                "new_value",
                format!("{} is unchanged at {}", self.parameter, self.new_value),
            ));
        }
        if self.justification.trim().is_empty() {
            return Err(Error::missing(
                "justification",
                "process changes must state why the parameter changed",
            ));
        }

        Ok(ProcessChange {
            id: uuid_utils::generate(),
            batch_id: self.batch_id,
            elapsed_hours: self.elapsed_hours,
            parameter: self.parameter.trim().to_string(),
            old_value: self.old_value,
            new_value: self.new_value,
            justification: self.justification.trim().to_string(),
            supervisor_approval: non_empty(self.supervisor_approval),
            changed_by: self.changed_by,
            recorded_at: self.recorded_at,
        })
    }
}

impl RecordInput for NewFailure {
    type Record = Failure;

    fn validate_and_compute(self, _thresholds: &Thresholds) -> Result<Failure> {
        self.reported_by.require(AuthLevel::Technician, "report failures")?;
        let severity = Severity::try_from(self.severity)?;
        let started_at = self
            .started_at
            .ok_or_else(|| Error::validation("started_at", "start time is required"))?;
        if let Some(ended_at) = self.ended_at {
            if ended_at < started_at {
                return Err(Error::validation(
                    "ended_at",
                    format!("end {} precedes start {}", ended_at, started_at),
                ));
            }
        }
        require_text("description", &self.description)?;

        Ok(Failure {
            id: uuid_utils::generate(),
            batch_id: self.batch_id,
            severity,
            category: self.category,
            description: self.description.trim().to_string(),
            started_at,
            ended_at: self.ended_at,
            root_cause: non_empty(self.root_cause),
            corrective_action: non_empty(self.corrective_action),
            impact: non_empty(self.impact),
            reported_by: self.reported_by,
            reported_at: self.reported_at,
            reviewed: false,
            reviewed_by: None,
            reviewed_at: None,
        })
    }
}

impl RecordInput for NewClosure {
    type Record = BatchClosure;

    /// The closer's authorization is a lifecycle guard, checked at accept time
    fn validate_and_compute(self, _thresholds: &Thresholds) -> Result<BatchClosure> {
        self.closed_by.require(AuthLevel::Technician, "close batches")?;
        require_non_negative("final_od", self.final_od)?;
        require_positive("total_runtime_hours", self.total_runtime_hours)?;
        if let Some(depletion) = self.glycerol_depletion_hours {
            require_non_negative("glycerol_depletion_hours", depletion)?;
            if depletion > self.total_runtime_hours {
                return Err(Error::validation(
                    "glycerol_depletion_hours",
                    format!(
                        "depletion at {} h is after the end of a {} h run",
                        depletion, self.total_runtime_hours
                    ),
                ));
            }
        }
        if let Some(spike) = self.peak_do_spike_percent {
            require_non_negative("peak_do_spike_percent", spike)?;
        }
        if let Some(base) = self.cumulative_base_ml {
            require_non_negative("cumulative_base_ml", base)?;
        }

        Ok(BatchClosure {
            id: uuid_utils::generate(),
            batch_id: self.batch_id,
            final_od: self.final_od,
            total_runtime_hours: self.total_runtime_hours,
            glycerol_depletion_hours: self.glycerol_depletion_hours,
            peak_do_spike_percent: self.peak_do_spike_percent,
            cumulative_base_ml: self.cumulative_base_ml,
            outcome: self.outcome,
            closed_by: self.closed_by,
            approved_by: non_empty(self.approved_by),
            closed_at: self.closed_at,
            notes: non_empty(self.notes),
        })
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}

fn require_finite(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::validation(field, format!("must be a finite number, got {}", value)));
    }
    Ok(())
}

fn require_positive(field: &str, value: f64) -> Result<()> {
    require_finite(field, value)?;
    if value <= 0.0 {
        return Err(Error::validation(field, format!("must be > 0, got {}", value)));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: f64) -> Result<()> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(Error::validation(field, format!("must be >= 0, got {}", value)));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
