//! Read models handed to the reporting and time-series collaborators

use crate::models::{
    Batch, BatchClosure, Calibration, Failure, Inoculation, MediaPreparation, ProcessChange,
    Sample,
};
use chrono::{DateTime, Utc};
use ferm_common::time;
use serde::Serialize;
use uuid::Uuid;

/// A batch with every child collection, each in its natural order
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecordSet {
    pub batch: Batch,
    pub media: Vec<MediaPreparation>,
    pub calibrations: Vec<Calibration>,
    pub inoculation: Option<Inoculation>,
    pub samples: Vec<Sample>,
    pub process_changes: Vec<ProcessChange>,
    pub failures: Vec<Failure>,
    pub closure: Option<BatchClosure>,
}

impl BatchRecordSet {
    pub fn time_origin(&self) -> Option<TimeOrigin> {
        TimeOrigin::of(&self.batch)
    }

    /// Failures still waiting for review
    pub fn open_failures(&self) -> impl Iterator<Item = &Failure> {
        self.failures.iter().filter(|f| !f.reviewed)
    }
}

/// Join key for the digital-twin pipeline: a batch and its T=0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeOrigin {
    pub batch_id: Uuid,
    pub inoculated_at: DateTime<Utc>,
}

impl TimeOrigin {
    pub fn of(batch: &Batch) -> Option<Self> {
        batch.inoculated_at.map(|inoculated_at| TimeOrigin {
            batch_id: batch.id,
            inoculated_at,
        })
    }

    /// Run-relative hours for an absolute timestamp
    pub fn elapsed_hours(&self, at: &DateTime<Utc>) -> f64 {
        time::hours_between(&self.inoculated_at, at)
    }
}
