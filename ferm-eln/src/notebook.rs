//! Notebook facade
//!
//! Every write follows the same path: validate and compute (pure), then a short
//! transaction that checks the batch status and persists. Status transitions
//! (inoculate, close, abort, critical failure) run as guard transactions:
//!
//! 1. claim the batch row (takes the write lock)
//! 2. load the [`BatchAggregate`](crate::lifecycle::BatchAggregate)
//! 3. evaluate the guard
//! 4. insert the triggering record
//! 5. compare-and-set the status
//!
//! Any error drops the transaction, so a rejected request leaves no trace.

use crate::db::{self, batches::PurgeCounts, batches::StatusStamp, LIVE_STATUSES, RUNNING_ONLY};
use crate::identity::{Actor, AuthLevel};
use crate::ledger;
use crate::lifecycle::{self, BatchStatus, GuardInput};
use crate::models::*;
use crate::report::{BatchRecordSet, TimeOrigin};
use crate::validation::RecordInput;
use chrono::{DateTime, Utc};
use ferm_common::{time, Error, Result, Thresholds};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Entry point for every notebook operation
#[derive(Debug, Clone)]
pub struct Notebook {
    pool: SqlitePool,
    thresholds: Thresholds,
    required: BTreeSet<ProbeType>,
}

impl Notebook {
    /// Wrap an initialized database pool
    pub fn new(pool: SqlitePool, thresholds: Thresholds) -> Result<Self> {
        thresholds.validate()?;
        let required = lifecycle::required_probes(&thresholds)?;
        Ok(Self {
            pool,
            thresholds,
            required,
        })
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    pub async fn create_batch(&self, input: NewBatch) -> Result<Batch> {
        let batch = input.validate_and_compute(&self.thresholds)?;

        let mut conn = self.pool.acquire().await?;
        db::batches::insert(&mut conn, &batch).await?;

        info!(
            batch_id = %batch.id,
            sequence_number = batch.sequence_number,
            phase = %batch.phase,
            vessel_id = %batch.vessel_id,
            operator = %batch.operator.id,
            "Batch created"
        );
        Ok(batch)
    }

    pub async fn batch(&self, batch_id: Uuid) -> Result<Batch> {
        let mut conn = self.pool.acquire().await?;
        db::batches::get(&mut conn, batch_id).await
    }

    /// All batches by sequence number
    pub async fn batches(&self) -> Result<Vec<Batch>> {
        let mut conn = self.pool.acquire().await?;
        db::batches::list(&mut conn).await
    }

    /// Explicit abort of a live batch; engineer or higher, with justification
    pub async fn abort_batch(&self, actor: &Actor, batch_id: Uuid, justification: &str) -> Result<Batch> {
        actor.require(AuthLevel::Engineer, "abort batches")?;
        let justification = justification.trim();
        if justification.is_empty() {
            return Err(Error::missing("justification", "an abort must state why the run was stopped"));
        }

        let mut tx = self.pool.begin().await?;
        db::batches::claim(&mut tx, batch_id).await?;
        let aggregate = db::batches::load_aggregate(&mut tx, batch_id).await?;
        let next = lifecycle::evaluate(&aggregate, GuardInput::Abort, &self.required, &self.thresholds)
            .inspect_err(|e| warn!(batch_id = %batch_id, error = %e, "Abort rejected"))?;

        let stamp = StatusStamp {
            completed_at: Some(time::now()),
            abort_reason: Some(format!("{} ({})", justification, actor.id)),
            ..StatusStamp::default()
        };
        db::batches::transition(&mut tx, &aggregate, next, &stamp).await?;
        let batch = db::batches::get(&mut tx, batch_id).await?;
        tx.commit().await?;

        warn!(
            batch_id = %batch_id,
            from = %aggregate.status,
            actor = %actor.id,
            reason = justification,
            "Batch aborted"
        );
        Ok(batch)
    }

    /// Remove a batch and all of its records; admin only
    pub async fn purge_batch(&self, actor: &Actor, batch_id: Uuid) -> Result<PurgeCounts> {
        actor.require(AuthLevel::Admin, "purge batches")?;

        let mut tx = self.pool.begin().await?;
        let counts = db::batches::purge(&mut tx, batch_id).await?;
        tx.commit().await?;

        warn!(
            batch_id = %batch_id,
            actor = %actor.id,
            child_records = counts.total(),
            "Batch purged"
        );
        Ok(counts)
    }

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    /// Record the batch's media; replaces an earlier preparation unless it was verified sterile
    pub async fn accept_media(&self, input: NewMediaPreparation) -> Result<Accepted<MediaPreparation>> {
        let media = input.validate_and_compute(&self.thresholds)?;
        let batch_id = media.batch_id;

        let mut tx = self.pool.begin().await?;
        let replaced = db::media::delete_unverified(&mut tx, batch_id).await?;
        if let Some(verified) = db::media::verified_id(&mut tx, batch_id).await? {
            return Err(Error::ImmutableRecord {
                entity: "media preparation".to_string(),
                id: verified,
                reason: "sterility verified, the recipe can no longer be replaced".to_string(),
            });
        }
        db::media::insert(&mut tx, &media).await?;
        let batch_status = db::batches::status(&mut tx, batch_id).await?;
        tx.commit().await?;

        info!(
            batch_id = %batch_id,
            media_id = %media.id,
            recipe = %media.recipe_name,
            volume_l = media.volume_l,
            replaced,
            "Media preparation recorded"
        );
        Ok(Accepted {
            record: media,
            batch_status,
        })
    }

    /// One-way sterility sign-off; freezes the preparation
    pub async fn verify_sterility(&self, actor: &Actor, media_id: Uuid) -> Result<MediaPreparation> {
        actor.require(AuthLevel::Technician, "verify media sterility")?;

        let mut conn = self.pool.acquire().await?;
        if !db::media::mark_sterile(&mut conn, media_id, &actor.id, &time::now()).await? {
            let existing = db::media::get(&mut conn, media_id).await?;
            if !existing.sterility_verified {
                return Err(
                    db::reject_child(&mut conn, existing.batch_id, "media sign-off", LIVE_STATUSES).await,
                );
            }
            return Err(Error::ImmutableRecord {
                entity: "media preparation".to_string(),
                id: existing.id,
                reason: format!(
                    "sterility already verified by {}",
                    existing.sterility_verified_by.as_deref().unwrap_or("unknown")
                ),
            });
        }
        let media = db::media::get(&mut conn, media_id).await?;

        info!(batch_id = %media.batch_id, media_id = %media_id, actor = %actor.id, "Media sterility verified");
        Ok(media)
    }

    pub async fn media(&self, batch_id: Uuid) -> Result<Vec<MediaPreparation>> {
        let mut conn = self.pool.acquire().await?;
        db::media::for_batch(&mut conn, batch_id).await
    }

    // ------------------------------------------------------------------
    // Calibrations
    // ------------------------------------------------------------------

    /// Failing calibrations are recorded too; only passing ones count toward inoculation
    pub async fn accept_calibration(&self, input: NewCalibration) -> Result<Accepted<Calibration>> {
        let calibration = input.validate_and_compute(&self.thresholds)?;

        let mut tx = self.pool.begin().await?;
        db::calibrations::insert(&mut tx, &calibration).await?;
        let batch_status = db::batches::status(&mut tx, calibration.batch_id).await?;
        tx.commit().await?;

        if calibration.passed {
            info!(
                batch_id = %calibration.batch_id,
                probe = %calibration.probe_type,
                slope_percent = ?calibration.slope_percent,
                drift = ?calibration.drift,
                "Calibration passed"
            );
        } else {
            warn!(
                batch_id = %calibration.batch_id,
                probe = %calibration.probe_type,
                slope_percent = ?calibration.slope_percent,
                drift = ?calibration.drift,
                "Calibration failed"
            );
        }
        Ok(Accepted {
            record: calibration,
            batch_status,
        })
    }

    pub async fn calibrations(&self, batch_id: Uuid) -> Result<Vec<Calibration>> {
        let mut conn = self.pool.acquire().await?;
        db::calibrations::for_batch(&mut conn, batch_id).await
    }

    // ------------------------------------------------------------------
    // Inoculation (Setup -> Running)
    // ------------------------------------------------------------------

    /// A second inoculation is a duplicate whatever its payload
    pub async fn accept_inoculation(&self, input: NewInoculation) -> Result<Accepted<Inoculation>> {
        if db::inoculations::exists(&mut *self.pool.acquire().await?, input.batch_id).await? {
            warn!(batch_id = %input.batch_id, "Duplicate inoculation rejected");
            return Err(Error::duplicate("inoculation", format!("batch {}", input.batch_id)));
        }
        let inoculation = input.validate_and_compute(&self.thresholds)?;
        let batch_id = inoculation.batch_id;

        let mut tx = self.pool.begin().await?;
        db::batches::claim(&mut tx, batch_id).await?;
        let aggregate = db::batches::load_aggregate(&mut tx, batch_id).await?;
        let next = lifecycle::evaluate(
            &aggregate,
            GuardInput::Inoculate {
                go_decision: inoculation.go_decision,
            },
            &self.required,
            &self.thresholds,
        )
        .inspect_err(|e| warn!(batch_id = %batch_id, error = %e, "Inoculation rejected"))?;

        db::inoculations::insert(&mut tx, &inoculation).await?;
        let stamp = StatusStamp {
            inoculated_at: Some(inoculation.performed_at),
            ..StatusStamp::default()
        };
        db::batches::transition(&mut tx, &aggregate, next, &stamp).await?;
        tx.commit().await?;

        info!(
            batch_id = %batch_id,
            density = inoculation.density,
            t0 = %inoculation.performed_at,
            "Batch inoculated"
        );
        Ok(Accepted {
            record: inoculation,
            batch_status: next,
        })
    }

    pub async fn inoculations(&self, batch_id: Uuid) -> Result<Vec<Inoculation>> {
        let mut conn = self.pool.acquire().await?;
        db::inoculations::for_batch(&mut conn, batch_id).await
    }

    // ------------------------------------------------------------------
    // Samples
    // ------------------------------------------------------------------

    /// Accept a sample, placing it on the run timeline relative to inoculation
    pub async fn accept_sample(&self, input: NewSample) -> Result<Accepted<Sample>> {
        let mut sample = input.validate_and_compute(&self.thresholds)?;

        // T=0 never changes once set, so it can be read outside the write transaction
        let batch = self.batch(sample.batch_id).await?;
        let origin = match (batch.status, TimeOrigin::of(&batch)) {
            (BatchStatus::Running, Some(origin)) => origin,
            _ => {
                return Err(Error::InvalidStateTransition {
                    batch_id: batch.id,
                    status: batch.status.to_string(),
                    guard: "samples require a running (inoculated) batch".to_string(),
                })
            }
        };

        let timepoint = origin.elapsed_hours(&sample.taken_at);
        if timepoint < 0.0 {
            return Err(Error::validation(
                "taken_at",
                format!("sample time {} precedes inoculation at {}", sample.taken_at, origin.inoculated_at),
            ));
        }
        sample.timepoint_hours = Some(timepoint);

        let mut tx = self.pool.begin().await?;
        db::samples::insert(&mut tx, &sample).await?;
        tx.commit().await?;

        if sample.contamination_detected {
            warn!(
                batch_id = %sample.batch_id,
                timepoint_hours = timepoint,
                "Sample flagged for contamination"
            );
        }
        info!(
            batch_id = %sample.batch_id,
            sample_id = %sample.id,
            timepoint_hours = timepoint,
            od_corrected = sample.od_corrected,
            dcw_g_per_l = ?sample.dcw_g_per_l,
            "Sample recorded"
        );
        Ok(Accepted {
            record: sample,
            batch_status: BatchStatus::Running,
        })
    }

    /// Samples in timepoint order
    pub async fn samples(&self, batch_id: Uuid) -> Result<Vec<Sample>> {
        let mut conn = self.pool.acquire().await?;
        db::samples::for_batch(&mut conn, batch_id).await
    }

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    pub async fn accept_process_change(&self, input: NewProcessChange) -> Result<Accepted<ProcessChange>> {
        let change = input.validate_and_compute(&self.thresholds)?;

        let mut tx = self.pool.begin().await?;
        db::ledger::insert_process_change(&mut tx, &change, RUNNING_ONLY).await?;
        tx.commit().await?;

        info!(
            batch_id = %change.batch_id,
            parameter = %change.parameter,
            old_value = change.old_value,
            new_value = change.new_value,
            elapsed_hours = change.elapsed_hours,
            actor = %change.changed_by.id,
            "Process change recorded"
        );
        Ok(Accepted {
            record: change,
            batch_status: BatchStatus::Running,
        })
    }

    pub async fn process_changes(&self, batch_id: Uuid) -> Result<Vec<ProcessChange>> {
        let mut conn = self.pool.acquire().await?;
        db::ledger::process_changes_for_batch(&mut conn, batch_id).await
    }

    /// Record a deviation; a critical failure aborts the batch in the same transaction
    pub async fn accept_failure(&self, input: NewFailure) -> Result<Accepted<Failure>> {
        let failure = input.validate_and_compute(&self.thresholds)?;
        let batch_id = failure.batch_id;

        let mut tx = self.pool.begin().await?;
        let batch_status = if failure.severity == Severity::Critical {
            db::batches::claim(&mut tx, batch_id).await?;
            let aggregate = db::batches::load_aggregate(&mut tx, batch_id).await?;
            let next =
                lifecycle::evaluate(&aggregate, GuardInput::Abort, &self.required, &self.thresholds)
                    .inspect_err(|e| {
                        warn!(batch_id = %batch_id, error = %e, "Critical failure rejected")
                    })?;

            db::ledger::insert_failure(&mut tx, &failure, LIVE_STATUSES).await?;
            let stamp = StatusStamp {
                completed_at: Some(failure.reported_at),
                abort_reason: Some(format!("critical {} failure: {}", failure.category, failure.description)),
                ..StatusStamp::default()
            };
            db::batches::transition(&mut tx, &aggregate, next, &stamp).await?;
            next
        } else {
            db::ledger::insert_failure(&mut tx, &failure, LIVE_STATUSES).await?;
            db::batches::status(&mut tx, batch_id).await?
        };
        tx.commit().await?;

        warn!(
            batch_id = %batch_id,
            failure_id = %failure.id,
            severity = u8::from(failure.severity),
            category = %failure.category,
            batch_status = %batch_status,
            "Failure recorded"
        );
        Ok(Accepted {
            record: failure,
            batch_status,
        })
    }

    pub async fn failures(&self, batch_id: Uuid) -> Result<Vec<Failure>> {
        let mut conn = self.pool.acquire().await?;
        db::ledger::failures_for_batch(&mut conn, batch_id).await
    }

    pub async fn failure(&self, failure_id: Uuid) -> Result<Failure> {
        let mut conn = self.pool.acquire().await?;
        db::ledger::get_failure(&mut conn, failure_id).await
    }

    /// Fill in investigation results before review, while the batch is live
    pub async fn amend_failure(
        &self,
        actor: &Actor,
        failure_id: Uuid,
        amendment: FailureAmendment,
    ) -> Result<Failure> {
        let mut conn = self.pool.acquire().await?;
        let current = db::ledger::get_failure(&mut conn, failure_id).await?;
        let amended = ledger::amend(&current, amendment, actor)?;

        if !db::ledger::update_unreviewed_failure(&mut conn, &amended, Some(LIVE_STATUSES)).await? {
            let latest = db::ledger::get_failure(&mut conn, failure_id).await?;
            if latest.reviewed {
                return Err(ledger::already_reviewed(&latest));
            }
            return Err(
                db::reject_child(&mut conn, latest.batch_id, "failure amendment", LIVE_STATUSES).await,
            );
        }

        info!(batch_id = %amended.batch_id, failure_id = %failure_id, actor = %actor.id, "Failure amended");
        Ok(amended)
    }

    /// The one review mutation; the failure is frozen afterwards
    pub async fn review_failure(&self, reviewer: &Actor, failure_id: Uuid) -> Result<Failure> {
        reviewer.require(AuthLevel::Engineer, "review failures")?;

        let mut conn = self.pool.acquire().await?;
        let current = db::ledger::get_failure(&mut conn, failure_id).await?;
        let reviewed = ledger::review(&current, reviewer, time::now())?;

        if !db::ledger::update_unreviewed_failure(&mut conn, &reviewed, None).await? {
            let latest = db::ledger::get_failure(&mut conn, failure_id).await?;
            return Err(ledger::already_reviewed(&latest));
        }

        info!(batch_id = %reviewed.batch_id, failure_id = %failure_id, reviewer = %reviewer.id, "Failure reviewed");
        Ok(reviewed)
    }

    // ------------------------------------------------------------------
    // Closure (Running -> Complete)
    // ------------------------------------------------------------------

    /// A second closure is a duplicate whatever its payload
    pub async fn accept_closure(&self, input: NewClosure) -> Result<Accepted<BatchClosure>> {
        if db::closures::exists(&mut *self.pool.acquire().await?, input.batch_id).await? {
            warn!(batch_id = %input.batch_id, "Duplicate closure rejected");
            return Err(Error::duplicate("closure", format!("batch {}", input.batch_id)));
        }
        let closure = input.validate_and_compute(&self.thresholds)?;
        let batch_id = closure.batch_id;

        let mut tx = self.pool.begin().await?;
        db::batches::claim(&mut tx, batch_id).await?;
        let aggregate = db::batches::load_aggregate(&mut tx, batch_id).await?;
        let next = lifecycle::evaluate(
            &aggregate,
            GuardInput::Close {
                closer: &closure.closed_by,
            },
            &self.required,
            &self.thresholds,
        )
        .inspect_err(|e| warn!(batch_id = %batch_id, error = %e, "Closure rejected"))?;

        db::closures::insert(&mut tx, &closure).await?;
        let stamp = StatusStamp {
            completed_at: Some(closure.closed_at),
            ..StatusStamp::default()
        };
        db::batches::transition(&mut tx, &aggregate, next, &stamp).await?;
        tx.commit().await?;

        info!(
            batch_id = %batch_id,
            outcome = %closure.outcome,
            final_od = closure.final_od,
            samples = aggregate.sample_count,
            closed_by = %closure.closed_by.id,
            "Batch closed"
        );
        Ok(Accepted {
            record: closure,
            batch_status: next,
        })
    }

    pub async fn closures(&self, batch_id: Uuid) -> Result<Vec<BatchClosure>> {
        let mut conn = self.pool.acquire().await?;
        db::closures::for_batch(&mut conn, batch_id).await
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Consistent snapshot of a batch and every child collection
    pub async fn record_set(&self, batch_id: Uuid) -> Result<BatchRecordSet> {
        let mut tx = self.pool.begin().await?;
        let batch = db::batches::get(&mut tx, batch_id).await?;
        let media = db::media::for_batch(&mut tx, batch_id).await?;
        let calibrations = db::calibrations::for_batch(&mut tx, batch_id).await?;
        let inoculation = db::inoculations::for_batch(&mut tx, batch_id).await?.into_iter().next();
        let samples = db::samples::for_batch(&mut tx, batch_id).await?;
        let process_changes = db::ledger::process_changes_for_batch(&mut tx, batch_id).await?;
        let failures = db::ledger::failures_for_batch(&mut tx, batch_id).await?;
        let closure = db::closures::for_batch(&mut tx, batch_id).await?.into_iter().next();
        tx.commit().await?;

        Ok(BatchRecordSet {
            batch,
            media,
            calibrations,
            inoculation,
            samples,
            process_changes,
            failures,
            closure,
        })
    }

    /// T=0 of a batch; `None` until inoculated
    pub async fn time_origin(&self, batch_id: Uuid) -> Result<Option<TimeOrigin>> {
        Ok(TimeOrigin::of(&self.batch(batch_id).await?))
    }

    /// Hours since inoculation at `at`; `None` until inoculated
    pub async fn elapsed_hours(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<Option<f64>> {
        Ok(self
            .time_origin(batch_id)
            .await?
            .map(|origin| origin.elapsed_hours(&at)))
    }
}
