//! Calibration validator
//!
//! Judges pass/fail per probe type:
//! - pH: two-point slope within the configured band
//! - DO / off-gas: response time below the ceiling and span reading within tolerance
//! - Temperature / pressure: single-point reading within an absolute tolerance
//!
//! A calibration missing a field its probe type needs is rejected, never passed.

use crate::calc;
use crate::models::{ProbeReadings, ProbeType};
use ferm_common::{Error, Result, Thresholds};

/// Derived calibration values and the pass/fail judgement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationVerdict {
    pub slope_percent: Option<f64>,
    pub drift: Option<f64>,
    pub passed: bool,
}

/// Assess a set of readings for the given probe type
pub fn assess(
    probe: ProbeType,
    readings: &ProbeReadings,
    thresholds: &Thresholds,
) -> Result<CalibrationVerdict> {
    match probe {
        ProbeType::Ph => assess_ph(readings, thresholds),
        ProbeType::Do | ProbeType::OffgasO2 | ProbeType::OffgasCo2 => {
            assess_gas(probe, readings, thresholds)
        }
        ProbeType::Temperature => {
            assess_single_point(probe, readings, thresholds.temperature_tolerance_c)
        }
        ProbeType::Pressure => assess_single_point(probe, readings, thresholds.pressure_tolerance_bar),
    }
}

fn assess_ph(readings: &ProbeReadings, thresholds: &Thresholds) -> Result<CalibrationVerdict> {
    let probe = ProbeType::Ph;
    let buffer_low = required(probe, "buffer_low", readings.buffer_low)?;
    let buffer_high = required(probe, "buffer_high", readings.buffer_high)?;
    let reading_low = required(probe, "reading_low_mv", readings.reading_low_mv)?;
    let reading_high = required(probe, "reading_high_mv", readings.reading_high_mv)?;

    let slope = calc::ph_slope_percent(
        buffer_low,
        buffer_high,
        reading_low,
        reading_high,
        thresholds.ph_ideal_slope_mv,
    );

    // Undetermined slope cannot demonstrate a working electrode
    let passed = slope.is_some_and(|s| {
        s >= thresholds.ph_slope_min_percent && s <= thresholds.ph_slope_max_percent
    });

    Ok(CalibrationVerdict {
        slope_percent: slope,
        drift: None,
        passed,
    })
}

fn assess_gas(
    probe: ProbeType,
    readings: &ProbeReadings,
    thresholds: &Thresholds,
) -> Result<CalibrationVerdict> {
    let response_time = required(probe, "response_time_s", readings.response_time_s)?;
    let reference = required(probe, "reference_value", readings.reference_value)?;
    let reading = required(probe, "reading_value", readings.reading_value)?;

    if response_time < 0.0 {
        return Err(Error::validation(
            "response_time_s",
            format!("must be >= 0, got {}", response_time),
        ));
    }

    let within_span = calc::span_error_percent(reading, reference)
        .is_some_and(|e| e <= thresholds.gas_span_tolerance_percent);

    Ok(CalibrationVerdict {
        slope_percent: None,
        drift: Some(calc::drift(reading, reference)),
        passed: response_time < thresholds.gas_response_ceiling_s && within_span,
    })
}

fn assess_single_point(
    probe: ProbeType,
    readings: &ProbeReadings,
    tolerance: f64,
) -> Result<CalibrationVerdict> {
    let reference = required(probe, "reference_value", readings.reference_value)?;
    let reading = required(probe, "reading_value", readings.reading_value)?;
    let drift = calc::drift(reading, reference);

    Ok(CalibrationVerdict {
        slope_percent: None,
        drift: Some(drift),
        passed: drift.abs() <= tolerance,
    })
}

fn required(probe: ProbeType, field: &str, value: Option<f64>) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(Error::validation(field, format!("must be finite, got {}", v))),
        None => Err(Error::missing(
            field,
            format!("required for {} calibration", probe),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ph_readings(low_mv: f64, high_mv: f64) -> ProbeReadings {
        ProbeReadings {
            buffer_low: Some(4.0),
            buffer_high: Some(7.0),
            reading_low_mv: Some(low_mv),
            reading_high_mv: Some(high_mv),
            ..ProbeReadings::default()
        }
    }

    #[test]
    fn test_ph_within_band_passes() {
        let verdict = assess(ProbeType::Ph, &ph_readings(-177.0, 0.0), &Thresholds::default())
            .unwrap();
        assert!(verdict.passed);
        assert!((verdict.slope_percent.unwrap() - 99.7).abs() < 0.1);
    }

    #[test]
    fn test_ph_weak_electrode_fails() {
        // 150 mV over 3 pH units = ~84.5 %
        let verdict = assess(ProbeType::Ph, &ph_readings(-150.0, 0.0), &Thresholds::default())
            .unwrap();
        assert!(!verdict.passed);
    }

    #[test]
    fn test_ph_equal_buffers_recorded_as_failing() {
        let readings = ProbeReadings {
            buffer_low: Some(7.0),
            buffer_high: Some(7.0),
            reading_low_mv: Some(0.0),
            reading_high_mv: Some(1.0),
            ..ProbeReadings::default()
        };
        let verdict = assess(ProbeType::Ph, &readings, &Thresholds::default()).unwrap();
        assert_eq!(verdict.slope_percent, None);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_ph_missing_buffer_rejected() {
        let readings = ProbeReadings {
            buffer_high: Some(7.0),
            reading_low_mv: Some(-177.0),
            reading_high_mv: Some(0.0),
            ..ProbeReadings::default()
        };
        let err = assess(ProbeType::Ph, &readings, &Thresholds::default()).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredContext { ref field, .. } if field == "buffer_low"));
    }

    #[test]
    fn test_do_requires_fast_response_and_span() {
        let thresholds = Thresholds::default();
        let good = ProbeReadings {
            reference_value: Some(100.0),
            reading_value: Some(99.0),
            response_time_s: Some(30.0),
            ..ProbeReadings::default()
        };
        assert!(assess(ProbeType::Do, &good, &thresholds).unwrap().passed);

        let slow = ProbeReadings {
            response_time_s: Some(90.0),
            ..good.clone()
        };
        assert!(!assess(ProbeType::Do, &slow, &thresholds).unwrap().passed);

        let off_span = ProbeReadings {
            reading_value: Some(90.0),
            ..good.clone()
        };
        assert!(!assess(ProbeType::OffgasO2, &off_span, &thresholds).unwrap().passed);

        let missing = ProbeReadings {
            response_time_s: None,
            ..good
        };
        assert!(matches!(
            assess(ProbeType::OffgasCo2, &missing, &thresholds),
            Err(Error::MissingRequiredContext { .. })
        ));
    }

    #[test]
    fn test_temperature_single_point() {
        let thresholds = Thresholds::default();
        let readings = ProbeReadings {
            reference_value: Some(30.0),
            reading_value: Some(30.3),
            ..ProbeReadings::default()
        };
        let verdict = assess(ProbeType::Temperature, &readings, &thresholds).unwrap();
        assert!(verdict.passed);
        assert!((verdict.drift.unwrap() - 0.3).abs() < 1e-9);

        let drifted = ProbeReadings {
            reading_value: Some(31.0),
            ..readings
        };
        assert!(!assess(ProbeType::Temperature, &drifted, &thresholds).unwrap().passed);
    }

    #[test]
    fn test_pressure_uses_its_own_tolerance() {
        let readings = ProbeReadings {
            reference_value: Some(1.0),
            reading_value: Some(1.2),
            ..ProbeReadings::default()
        };
        assert!(!assess(ProbeType::Pressure, &readings, &Thresholds::default()).unwrap().passed);
    }
}
