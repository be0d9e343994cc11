//! Batch lifecycle integration tests
//!
//! Drives batches through Setup -> Running -> Complete / Aborted against a real
//! SQLite notebook and checks every guard leaves the store untouched on rejection.

mod helpers;

use chrono::Duration;
use ferm_common::{Error, Thresholds};
use ferm_eln::models::*;
use ferm_eln::BatchStatus;
use helpers::*;

// ============================================================================
// Setup
// ============================================================================

#[tokio::test]
async fn test_new_batch_starts_in_setup() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 1).await;

    let stored = nb.batch(batch.id).await.unwrap();
    assert_eq!(stored.status, BatchStatus::Setup);
    assert_eq!(stored.operator, tech());
    assert_eq!(stored.inoculated_at, None);
}

#[tokio::test]
async fn test_sequence_number_is_unique() {
    let nb = notebook().await;
    create_batch(&nb, 7).await;

    let err = nb
        .create_batch(NewBatch {
            sequence_number: 7,
            phase: Phase::C,
            vessel_id: "BR-01".to_string(),
            operator: tech(),
            created_at: t0(),
            notes: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateRecord { .. }), "got {:?}", err);
    assert_eq!(nb.batches().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_viewer_cannot_create_batch() {
    let nb = notebook().await;
    let err = nb
        .create_batch(NewBatch {
            sequence_number: 3,
            phase: Phase::A,
            vessel_id: "BR-01".to_string(),
            operator: viewer(),
            created_at: t0(),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));
}

// ============================================================================
// Inoculation (Setup -> Running)
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 12).await;
    calibrate_required(&nb, batch.id).await;

    let accepted = nb.accept_inoculation(inoculation_input(batch.id)).await.unwrap();
    assert_eq!(accepted.batch_status, BatchStatus::Running);

    let running = nb.batch(batch.id).await.unwrap();
    assert_eq!(running.status, BatchStatus::Running);
    assert_eq!(running.inoculated_at, Some(t0()));

    add_samples(&nb, batch.id, 8).await;

    let closed = nb
        .accept_closure(closure_input(batch.id, engineer()))
        .await
        .unwrap();
    assert_eq!(closed.batch_status, BatchStatus::Complete);

    let complete = nb.batch(batch.id).await.unwrap();
    assert_eq!(complete.status, BatchStatus::Complete);
    assert_eq!(complete.completed_at, Some(t0() + Duration::hours(40)));
    assert_eq!(nb.closures(batch.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_inoculation_requires_every_probe() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 2).await;
    calibrate(&nb, batch.id, ProbeType::Ph, true).await;

    let err = nb
        .accept_inoculation(inoculation_input(batch.id))
        .await
        .unwrap_err();

    match err {
        Error::InvalidStateTransition { guard, status, .. } => {
            assert_eq!(status, "setup");
            assert!(guard.contains("do"), "guard was: {}", guard);
            assert!(guard.contains("temperature"), "guard was: {}", guard);
        }
        other => panic!("expected InvalidStateTransition, got {:?}", other),
    }

    // Rejected guard leaves no inoculation and no status change
    assert!(nb.inoculations(batch.id).await.unwrap().is_empty());
    assert_eq!(nb.batch(batch.id).await.unwrap().status, BatchStatus::Setup);
}

#[tokio::test]
async fn test_failing_calibration_recorded_but_not_counted() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 4).await;
    calibrate(&nb, batch.id, ProbeType::Ph, true).await;
    calibrate(&nb, batch.id, ProbeType::Temperature, true).await;
    let failed = calibrate(&nb, batch.id, ProbeType::Do, false).await;
    assert!(!failed.passed);

    assert!(matches!(
        nb.accept_inoculation(inoculation_input(batch.id)).await,
        Err(Error::InvalidStateTransition { .. })
    ));

    // A passing recalibration unblocks the run
    calibrate(&nb, batch.id, ProbeType::Do, true).await;
    nb.accept_inoculation(inoculation_input(batch.id)).await.unwrap();
    assert_eq!(nb.calibrations(batch.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_required_probes_are_configurable() {
    let nb = notebook_with(Thresholds {
        required_probes: vec!["ph".to_string()],
        ..Thresholds::default()
    })
    .await;
    let batch = create_batch(&nb, 5).await;
    calibrate(&nb, batch.id, ProbeType::Ph, true).await;

    let accepted = nb.accept_inoculation(inoculation_input(batch.id)).await.unwrap();
    assert_eq!(accepted.batch_status, BatchStatus::Running);
}

#[tokio::test]
async fn test_no_go_inoculation_rejected() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 6).await;
    calibrate_required(&nb, batch.id).await;

    let mut input = inoculation_input(batch.id);
    input.go_decision = None;
    assert!(matches!(
        nb.accept_inoculation(input).await,
        Err(Error::InvalidStateTransition { .. })
    ));
    assert_eq!(nb.batch(batch.id).await.unwrap().status, BatchStatus::Setup);
}

#[tokio::test]
async fn test_low_inoculum_density_rejected() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 8).await;
    calibrate_required(&nb, batch.id).await;

    let mut input = inoculation_input(batch.id);
    input.density = 0.05;
    assert!(matches!(
        nb.accept_inoculation(input).await,
        Err(Error::Validation { ref field, .. }) if field == "density"
    ));
}

#[tokio::test]
async fn test_second_inoculation_is_duplicate() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 9).await;

    let err = nb
        .accept_inoculation(inoculation_input(batch.id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateRecord { .. }), "got {:?}", err);
    assert_eq!(nb.inoculations(batch.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_inoculation_is_duplicate_whatever_the_payload() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 10).await;

    let mut thin = inoculation_input(batch.id);
    thin.density = 0.01;
    let mut unnamed = inoculation_input(batch.id);
    unnamed.source = " ".to_string();
    let mut by_viewer = inoculation_input(batch.id);
    by_viewer.performed_by = viewer();

    for input in [thin, unnamed, by_viewer] {
        let err = nb.accept_inoculation(input).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateRecord { .. }), "got {:?}", err);
    }
    assert_eq!(nb.inoculations(batch.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_closure_is_duplicate_whatever_the_payload() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 11).await;
    add_samples(&nb, batch.id, 8).await;
    nb.accept_closure(closure_input(batch.id, engineer())).await.unwrap();

    let mut invalid = closure_input(batch.id, tech());
    invalid.final_od = -1.0;
    let err = nb.accept_closure(invalid).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateRecord { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_inoculating_unknown_batch_is_not_found() {
    let nb = notebook().await;
    assert!(matches!(
        nb.accept_inoculation(inoculation_input(uuid::Uuid::new_v4())).await,
        Err(Error::NotFound(_))
    ));
}

// ============================================================================
// Samples
// ============================================================================

#[tokio::test]
async fn test_sample_before_inoculation_rejected() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 10).await;

    let err = nb.accept_sample(sample_input(batch.id, 4)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }), "got {:?}", err);
    assert!(nb.samples(batch.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sample_timepoints_relative_to_inoculation() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 11).await;

    // Out of order on purpose
    for hours in [12, 4, 8] {
        nb.accept_sample(sample_input(batch.id, hours)).await.unwrap();
    }

    let timepoints: Vec<f64> = nb
        .samples(batch.id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.timepoint_hours.unwrap())
        .collect();
    assert_eq!(timepoints, vec![4.0, 8.0, 12.0]);
}

#[tokio::test]
async fn test_sample_before_t0_rejected() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 13).await;

    let err = nb.accept_sample(sample_input(batch.id, -1)).await.unwrap_err();
    assert!(matches!(err, Error::Validation { ref field, .. } if field == "taken_at"));
}

#[tokio::test]
async fn test_sample_derived_values_persisted() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 14).await;

    let mut input = sample_input(batch.id, 6);
    input.od_raw = 0.5;
    input.dilution_factor = 20.0;
    input.wet_weight_g = Some(0.100);
    input.dry_weight_g = Some(0.140);
    input.filtered_volume_ml = Some(10.0);
    input.contamination_detected = true;
    input.microscopy_notes = Some("Cocci present in 3 of 10 fields".to_string());
    nb.accept_sample(input).await.unwrap();

    let stored = &nb.samples(batch.id).await.unwrap()[0];
    assert!((stored.od_corrected - 10.0).abs() < 1e-9);
    assert!((stored.dcw_g_per_l.unwrap() - 4.0).abs() < 1e-9);
    assert!(stored.dcw_deviation_percent.unwrap().abs() < 1e-6);
    assert!(stored.contamination_detected);
}

#[tokio::test]
async fn test_contamination_without_notes_rejected() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 15).await;

    let mut input = sample_input(batch.id, 6);
    input.contamination_detected = true;
    assert!(matches!(
        nb.accept_sample(input).await,
        Err(Error::MissingRequiredContext { .. })
    ));
}

// ============================================================================
// Closure (Running -> Complete)
// ============================================================================

#[tokio::test]
async fn test_closure_needs_minimum_samples() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 20).await;
    add_samples(&nb, batch.id, 7).await;

    let err = nb
        .accept_closure(closure_input(batch.id, engineer()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }), "got {:?}", err);
    assert!(nb.closures(batch.id).await.unwrap().is_empty());

    nb.accept_sample(sample_input(batch.id, 40)).await.unwrap();
    let accepted = nb
        .accept_closure(closure_input(batch.id, engineer()))
        .await
        .unwrap();
    assert_eq!(accepted.batch_status, BatchStatus::Complete);
}

#[tokio::test]
async fn test_technician_cannot_close() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 21).await;
    add_samples(&nb, batch.id, 8).await;

    assert!(matches!(
        nb.accept_closure(closure_input(batch.id, tech())).await,
        Err(Error::InvalidStateTransition { .. })
    ));
    assert_eq!(nb.batch(batch.id).await.unwrap().status, BatchStatus::Running);
}

#[tokio::test]
async fn test_second_closure_is_duplicate() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 22).await;
    add_samples(&nb, batch.id, 8).await;
    nb.accept_closure(closure_input(batch.id, engineer())).await.unwrap();

    assert!(matches!(
        nb.accept_closure(closure_input(batch.id, engineer())).await,
        Err(Error::DuplicateRecord { .. })
    ));
}

#[tokio::test]
async fn test_closure_from_setup_rejected() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 23).await;
    assert!(matches!(
        nb.accept_closure(closure_input(batch.id, engineer())).await,
        Err(Error::InvalidStateTransition { .. })
    ));
}

// ============================================================================
// Abort and terminal states
// ============================================================================

#[tokio::test]
async fn test_explicit_abort() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 30).await;

    assert!(matches!(
        nb.abort_batch(&tech(), batch.id, "foaming").await,
        Err(Error::Unauthorized { .. })
    ));
    assert!(matches!(
        nb.abort_batch(&engineer(), batch.id, "   ").await,
        Err(Error::MissingRequiredContext { .. })
    ));

    let aborted = nb
        .abort_batch(&engineer(), batch.id, "Uncontrolled foaming")
        .await
        .unwrap();
    assert_eq!(aborted.status, BatchStatus::Aborted);
    assert!(aborted.abort_reason.unwrap().contains("Uncontrolled foaming"));
    assert!(aborted.completed_at.is_some());
}

#[tokio::test]
async fn test_terminal_batch_rejects_children() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 31).await;
    nb.abort_batch(&engineer(), batch.id, "Vessel breach").await.unwrap();

    assert!(matches!(
        nb.accept_sample(sample_input(batch.id, 4)).await,
        Err(Error::InvalidStateTransition { .. })
    ));
    let err = nb
        .accept_calibration(NewCalibration {
            batch_id: batch.id,
            probe_type: ProbeType::Ph,
            readings: readings(ProbeType::Ph, true),
            performed_by: tech(),
            performed_at: t0(),
            notes: None,
        })
        .await
        .unwrap_err();
    match err {
        Error::InvalidStateTransition { status, .. } => assert_eq!(status, "aborted"),
        other => panic!("expected InvalidStateTransition, got {:?}", other),
    }
    assert!(matches!(
        nb.accept_failure(failure_input(batch.id, 1)).await,
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        nb.abort_batch(&engineer(), batch.id, "again").await,
        Err(Error::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn test_complete_batch_cannot_abort() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 32).await;
    add_samples(&nb, batch.id, 8).await;
    nb.accept_closure(closure_input(batch.id, engineer())).await.unwrap();

    assert!(matches!(
        nb.abort_batch(&admin(), batch.id, "too late").await,
        Err(Error::InvalidStateTransition { .. })
    ));
    assert_eq!(nb.batch(batch.id).await.unwrap().status, BatchStatus::Complete);
}

// ============================================================================
// Time origin
// ============================================================================

#[tokio::test]
async fn test_time_origin_and_elapsed_hours() {
    let nb = notebook().await;
    let setup = create_batch(&nb, 40).await;
    assert_eq!(nb.time_origin(setup.id).await.unwrap(), None);
    assert_eq!(nb.elapsed_hours(setup.id, t0()).await.unwrap(), None);

    let running = running_batch(&nb, 41).await;
    let origin = nb.time_origin(running.id).await.unwrap().unwrap();
    assert_eq!(origin.inoculated_at, t0());
    assert_eq!(
        nb.elapsed_hours(running.id, t0() + Duration::minutes(150))
            .await
            .unwrap(),
        Some(2.5)
    );
}
