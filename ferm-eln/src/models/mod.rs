//! Notebook record types
//!
//! Each record type comes as a `New*` input (what a collaborator submits) and a
//! validated record carrying derived values (what the engine persists and returns).

mod batch;
mod calibration;
mod closure;
mod inoculation;
mod ledger;
mod media;
mod sample;

pub use batch::{Batch, NewBatch, Phase};
pub use calibration::{Calibration, NewCalibration, ProbeReadings, ProbeType};
pub use closure::{BatchClosure, NewClosure, Outcome};
pub use inoculation::{Inoculation, NewInoculation};
pub use ledger::{
    Failure, FailureAmendment, FailureCategory, NewFailure, NewProcessChange, ProcessChange,
    Severity,
};
pub use media::{MediaComponent, MediaPreparation, NewMediaPreparation};
pub use sample::{NewSample, Sample};

use crate::lifecycle::BatchStatus;
use serde::Serialize;

/// A record accepted by the engine, with the batch status after acceptance
#[derive(Debug, Clone, Serialize)]
pub struct Accepted<T> {
    pub record: T,
    pub batch_status: BatchStatus,
}
