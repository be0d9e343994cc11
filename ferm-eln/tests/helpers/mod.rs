//! Shared fixtures for notebook integration tests
//!
//! Every test gets its own temporary notebook database.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ferm_common::db::init_database;
use ferm_common::Thresholds;
use ferm_eln::models::*;
use ferm_eln::{Actor, AuthLevel, Notebook};
use tempfile::TempDir;
use uuid::Uuid;

/// Notebook backed by a temp database; the directory lives as long as the fixture
pub struct TestNotebook {
    pub notebook: Notebook,
    _dir: TempDir,
}

impl std::ops::Deref for TestNotebook {
    type Target = Notebook;

    fn deref(&self) -> &Notebook {
        &self.notebook
    }
}

pub async fn notebook() -> TestNotebook {
    notebook_with(Thresholds::default()).await
}

pub async fn notebook_with(thresholds: Thresholds) -> TestNotebook {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("notebook.db")).await.unwrap();
    TestNotebook {
        notebook: Notebook::new(pool, thresholds).unwrap(),
        _dir: dir,
    }
}

pub fn viewer() -> Actor {
    Actor::new("v.auditor", AuthLevel::Viewer)
}

pub fn tech() -> Actor {
    Actor::new("t.nguyen", AuthLevel::Technician)
}

pub fn engineer() -> Actor {
    Actor::new("e.okafor", AuthLevel::Engineer)
}

pub fn admin() -> Actor {
    Actor::new("a.root", AuthLevel::Admin)
}

/// Inoculation time used by every fixture run
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

pub async fn create_batch(nb: &Notebook, sequence_number: u32) -> Batch {
    nb.create_batch(NewBatch {
        sequence_number,
        phase: Phase::B,
        vessel_id: "BR-02".to_string(),
        operator: tech(),
        created_at: t0() - Duration::hours(24),
        notes: None,
    })
    .await
    .unwrap()
}

/// Readings that pass (or fail) with default thresholds
pub fn readings(probe: ProbeType, passing: bool) -> ProbeReadings {
    match probe {
        ProbeType::Ph => ProbeReadings {
            buffer_low: Some(4.0),
            buffer_high: Some(7.0),
            reading_low_mv: Some(if passing { -177.0 } else { -140.0 }),
            reading_high_mv: Some(0.0),
            ..ProbeReadings::default()
        },
        ProbeType::Do | ProbeType::OffgasO2 | ProbeType::OffgasCo2 => ProbeReadings {
            reference_value: Some(100.0),
            reading_value: Some(99.5),
            response_time_s: Some(if passing { 25.0 } else { 95.0 }),
            ..ProbeReadings::default()
        },
        ProbeType::Temperature => ProbeReadings {
            reference_value: Some(30.0),
            reading_value: Some(if passing { 30.2 } else { 31.5 }),
            ..ProbeReadings::default()
        },
        ProbeType::Pressure => ProbeReadings {
            reference_value: Some(1.0),
            reading_value: Some(if passing { 1.01 } else { 1.3 }),
            ..ProbeReadings::default()
        },
    }
}

pub async fn calibrate(nb: &Notebook, batch_id: Uuid, probe: ProbeType, passing: bool) -> Calibration {
    nb.accept_calibration(NewCalibration {
        batch_id,
        probe_type: probe,
        readings: readings(probe, passing),
        performed_by: tech(),
        performed_at: t0() - Duration::hours(12),
        notes: None,
    })
    .await
    .unwrap()
    .record
}

/// Passing calibrations for pH, DO and temperature
pub async fn calibrate_required(nb: &Notebook, batch_id: Uuid) {
    for probe in [ProbeType::Ph, ProbeType::Do, ProbeType::Temperature] {
        calibrate(nb, batch_id, probe, true).await;
    }
}

pub fn inoculation_input(batch_id: Uuid) -> NewInoculation {
    NewInoculation {
        batch_id,
        source: "WCB vial 12".to_string(),
        density: 1.2,
        microscopy_notes: Some("Healthy budding cells".to_string()),
        go_decision: Some(true),
        performed_by: tech(),
        performed_at: t0(),
    }
}

/// Calibrated and inoculated batch
pub async fn running_batch(nb: &Notebook, sequence_number: u32) -> Batch {
    let batch = create_batch(nb, sequence_number).await;
    calibrate_required(nb, batch.id).await;
    nb.accept_inoculation(inoculation_input(batch.id)).await.unwrap();
    nb.batch(batch.id).await.unwrap()
}

pub fn sample_input(batch_id: Uuid, hours_after_t0: i64) -> NewSample {
    NewSample {
        batch_id,
        taken_at: t0() + Duration::hours(hours_after_t0),
        od_raw: 0.3 + 0.05 * hours_after_t0 as f64,
        dilution_factor: 10.0,
        wet_weight_g: None,
        dry_weight_g: None,
        filtered_volume_ml: None,
        contamination_detected: false,
        microscopy_notes: None,
        taken_by: tech(),
    }
}

/// `count` samples, four hours apart
pub async fn add_samples(nb: &Notebook, batch_id: Uuid, count: i64) {
    for i in 0..count {
        nb.accept_sample(sample_input(batch_id, 4 * (i + 1))).await.unwrap();
    }
}

pub fn closure_input(batch_id: Uuid, closed_by: Actor) -> NewClosure {
    NewClosure {
        batch_id,
        final_od: 312.0,
        total_runtime_hours: 40.0,
        glycerol_depletion_hours: Some(22.5),
        peak_do_spike_percent: Some(38.0),
        cumulative_base_ml: Some(410.0),
        outcome: Outcome::Success,
        closed_by,
        approved_by: Some("lab.lead".to_string()),
        closed_at: t0() + Duration::hours(40),
        notes: None,
    }
}

pub fn failure_input(batch_id: Uuid, severity: u8) -> NewFailure {
    NewFailure {
        batch_id,
        severity,
        category: FailureCategory::Equipment,
        description: "Feed pump stalled".to_string(),
        started_at: Some(Utc::now() - Duration::hours(1)),
        ended_at: None,
        root_cause: None,
        corrective_action: None,
        impact: None,
        reported_by: tech(),
        reported_at: Utc::now(),
    }
}
