//! Audit / deviation ledger rules
//!
//! Process changes are append-only and have no mutation path at all. A failure may be
//! amended with investigation results while unreviewed, and accepts exactly one review;
//! after review every field is frozen.

use crate::identity::{Actor, AuthLevel};
use crate::models::{Failure, FailureAmendment};
use chrono::{DateTime, Utc};
use ferm_common::{Error, Result};

/// Apply investigation results to an unreviewed failure
pub fn amend(failure: &Failure, amendment: FailureAmendment, actor: &Actor) -> Result<Failure> {
    actor.require(AuthLevel::Technician, "amend failures")?;
    ensure_unreviewed(failure)?;

    let FailureAmendment {
        ended_at,
        root_cause,
        corrective_action,
        impact,
    } = amendment;

    let root_cause = non_blank(root_cause);
    let corrective_action = non_blank(corrective_action);
    let impact = non_blank(impact);
    if ended_at.is_none() && root_cause.is_none() && corrective_action.is_none() && impact.is_none()
    {
        return Err(Error::validation("amendment", "nothing to amend"));
    }

    if let Some(end) = ended_at {
        if end < failure.started_at {
            return Err(Error::validation(
                "ended_at",
                format!("end {} precedes start {}", end, failure.started_at),
            ));
        }
    }

    let mut amended = failure.clone();
    if ended_at.is_some() {
        amended.ended_at = ended_at;
    }
    if root_cause.is_some() {
        amended.root_cause = root_cause;
    }
    if corrective_action.is_some() {
        amended.corrective_action = corrective_action;
    }
    if impact.is_some() {
        amended.impact = impact;
    }
    Ok(amended)
}

/// The single review mutation
pub fn review(failure: &Failure, reviewer: &Actor, at: DateTime<Utc>) -> Result<Failure> {
    reviewer.require(AuthLevel::Engineer, "review failures")?;
    ensure_unreviewed(failure)?;

    let mut reviewed = failure.clone();
    reviewed.reviewed = true;
    reviewed.reviewed_by = Some(reviewer.id.clone());
    reviewed.reviewed_at = Some(at);
    Ok(reviewed)
}

/// Error for a failure whose stored row turned out to be reviewed already
pub fn already_reviewed(failure: &Failure) -> Error {
    Error::ImmutableRecord {
        entity: "failure".to_string(),
        id: failure.id,
        reason: match &failure.reviewed_by {
            Some(by) => format!("reviewed by {}", by),
            None => "already reviewed".to_string(),
        },
    }
}

fn ensure_unreviewed(failure: &Failure) -> Result<()> {
    if failure.reviewed {
        return Err(already_reviewed(failure));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureCategory, Severity};
    use chrono::Duration;
    use uuid::Uuid;

    fn open_failure() -> Failure {
        let now = Utc::now();
        Failure {
            id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            severity: Severity::Major,
            category: FailureCategory::Sensor,
            description: "DO probe reading flat at 0%".to_string(),
            started_at: now - Duration::hours(2),
            ended_at: None,
            root_cause: None,
            corrective_action: None,
            impact: None,
            reported_by: Actor::new("t.nguyen", AuthLevel::Technician),
            reported_at: now,
            reviewed: false,
            reviewed_by: None,
            reviewed_at: None,
        }
    }

    #[test]
    fn test_review_is_one_way() {
        let engineer = Actor::new("e.okafor", AuthLevel::Engineer);
        let reviewed = review(&open_failure(), &engineer, Utc::now()).unwrap();
        assert!(reviewed.reviewed);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("e.okafor"));

        let again = review(&reviewed, &engineer, Utc::now()).unwrap_err();
        assert!(matches!(again, Error::ImmutableRecord { .. }));
    }

    #[test]
    fn test_review_requires_engineer() {
        let tech = Actor::new("t.nguyen", AuthLevel::Technician);
        assert!(matches!(
            review(&open_failure(), &tech, Utc::now()),
            Err(Error::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_amend_fills_investigation_fields() {
        let failure = open_failure();
        let tech = Actor::new("t.nguyen", AuthLevel::Technician);
        let amended = amend(
            &failure,
            FailureAmendment {
                ended_at: Some(failure.started_at + Duration::minutes(40)),
                root_cause: Some("Membrane fouled".to_string()),
                corrective_action: None,
                impact: Some("  ".to_string()),
            },
            &tech,
        )
        .unwrap();

        assert_eq!(amended.root_cause.as_deref(), Some("Membrane fouled"));
        assert!(amended.ended_at.is_some());
        assert_eq!(amended.impact, None);
        assert_eq!(amended.description, failure.description);
    }

    #[test]
    fn test_amend_rejects_end_before_start() {
        let failure = open_failure();
        let tech = Actor::new("t.nguyen", AuthLevel::Technician);
        let err = amend(
            &failure,
            FailureAmendment {
                ended_at: Some(failure.started_at - Duration::minutes(1)),
                ..FailureAmendment::default()
            },
            &tech,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "ended_at"));
    }

    #[test]
    fn test_amend_after_review_is_immutable() {
        let engineer = Actor::new("e.okafor", AuthLevel::Engineer);
        let reviewed = review(&open_failure(), &engineer, Utc::now()).unwrap();
        let err = amend(
            &reviewed,
            FailureAmendment {
                root_cause: Some("late finding".to_string()),
                ..FailureAmendment::default()
            },
            &engineer,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImmutableRecord { .. }));
    }

    #[test]
    fn test_empty_amendment_rejected() {
        let tech = Actor::new("t.nguyen", AuthLevel::Technician);
        assert!(amend(&open_failure(), FailureAmendment::default(), &tech).is_err());
    }
}
