//! Batch lifecycle state machine
//!
//! ```text
//! Setup ──inoculate──> Running ──close──> Complete
//!   │                     │
//!   └──────abort──────────┴──────────> Aborted
//! ```
//!
//! Transitions are monotonic; Complete and Aborted are terminal. Legality is a lookup
//! in [`TRANSITIONS`]; guards are evaluated against a [`BatchAggregate`] snapshot read
//! inside the same transaction that performs the write.

use crate::identity::{Actor, AuthLevel};
use crate::models::ProbeType;
use ferm_common::{Error, Result, Thresholds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Canonical status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Setup,
    Running,
    Complete,
    Aborted,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Setup => "setup",
            BatchStatus::Running => "running",
            BatchStatus::Complete => "complete",
            BatchStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "setup" => Ok(BatchStatus::Setup),
            "running" => Ok(BatchStatus::Running),
            "complete" => Ok(BatchStatus::Complete),
            "aborted" => Ok(BatchStatus::Aborted),
            other => Err(Error::validation("status", format!("unknown status '{}'", other))),
        }
    }
}

/// Lifecycle events that move a batch between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Inoculate,
    Close,
    Abort,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Inoculate => "inoculate",
            Transition::Close => "close",
            Transition::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// Legal transitions: (from, event, to)
pub const TRANSITIONS: [(BatchStatus, Transition, BatchStatus); 4] = [
    (BatchStatus::Setup, Transition::Inoculate, BatchStatus::Running),
    (BatchStatus::Running, Transition::Close, BatchStatus::Complete),
    (BatchStatus::Setup, Transition::Abort, BatchStatus::Aborted),
    (BatchStatus::Running, Transition::Abort, BatchStatus::Aborted),
];

/// Target status of `event` from `from`, if the table allows it
pub fn target(from: BatchStatus, event: Transition) -> Option<BatchStatus> {
    TRANSITIONS
        .iter()
        .find(|(f, e, _)| *f == from && *e == event)
        .map(|(_, _, to)| *to)
}

/// Snapshot of a batch and its child-record counts, read inside a guard transaction
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAggregate {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub revision: i64,
    pub passing_probes: BTreeSet<ProbeType>,
    pub sample_count: u32,
    pub has_inoculation: bool,
    pub has_closure: bool,
}

/// Per-event guard inputs that come from the request rather than the store
#[derive(Debug, Clone, Copy)]
pub enum GuardInput<'a> {
    Inoculate { go_decision: bool },
    Close { closer: &'a Actor },
    Abort,
}

impl GuardInput<'_> {
    fn transition(&self) -> Transition {
        match self {
            GuardInput::Inoculate { .. } => Transition::Inoculate,
            GuardInput::Close { .. } => Transition::Close,
            GuardInput::Abort => Transition::Abort,
        }
    }
}

/// Parse the configured list of probes required before inoculation
pub fn required_probes(thresholds: &Thresholds) -> Result<BTreeSet<ProbeType>> {
    thresholds
        .required_probes
        .iter()
        .map(|p| {
            p.parse::<ProbeType>()
                .map_err(|_| Error::Config(format!("unknown required probe '{}'", p)))
        })
        .collect()
}

/// Evaluate the guard for a transition; returns the new status when every check passes
///
/// Uniqueness is checked before status so a second inoculation or closure always reports
/// `DuplicateRecord`, whatever state the first one moved the batch into.
pub fn evaluate(
    aggregate: &BatchAggregate,
    input: GuardInput<'_>,
    required: &BTreeSet<ProbeType>,
    thresholds: &Thresholds,
) -> Result<BatchStatus> {
    let event = input.transition();

    match input {
        GuardInput::Inoculate { .. } if aggregate.has_inoculation => {
            return Err(Error::duplicate(
                "inoculation",
                format!("batch {}", aggregate.batch_id),
            ));
        }
        GuardInput::Close { .. } if aggregate.has_closure => {
            return Err(Error::duplicate("closure", format!("batch {}", aggregate.batch_id)));
        }
        _ => {}
    }

    let next = target(aggregate.status, event).ok_or_else(|| {
        rejected(
            aggregate,
            format!("cannot {} a batch in status {}", event, aggregate.status),
        )
    })?;

    match input {
        GuardInput::Inoculate { go_decision } => {
            let missing: Vec<&str> = required
                .iter()
                .filter(|p| !aggregate.passing_probes.contains(p))
                .map(|p| p.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(rejected(
                    aggregate,
                    format!("no passing calibration for: {}", missing.join(", ")),
                ));
            }
            if !go_decision {
                return Err(rejected(aggregate, "inoculum go/no-go decision is no-go".to_string()));
            }
        }
        GuardInput::Close { closer } => {
            let min = thresholds.min_samples_for_closure;
            if aggregate.sample_count < min {
                return Err(rejected(
                    aggregate,
                    format!(
                        "closure requires at least {} samples, batch has {}",
                        min, aggregate.sample_count
                    ),
                ));
            }
            if closer.level < AuthLevel::Engineer {
                return Err(rejected(
                    aggregate,
                    format!("closer {} is {}, engineer or higher required", closer.id, closer.level),
                ));
            }
        }
        GuardInput::Abort => {}
    }

    Ok(next)
}

fn rejected(aggregate: &BatchAggregate, guard: String) -> Error {
    Error::InvalidStateTransition {
        batch_id: aggregate.batch_id,
        status: aggregate.status.to_string(),
        guard,
    }
}
