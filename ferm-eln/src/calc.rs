//! Unit conversion and derived-value calculator
//!
//! Pure functions turning raw instrument readings into reportable quantities.
//! "Undetermined" results are `None`, never errors: DCW is optional per sample and
//! single-point probes have no slope.

use ferm_common::{Error, Result};

/// Nernstian pH electrode slope at 25 °C, mV per pH unit
pub const IDEAL_PH_SLOPE_MV: f64 = 59.16;

/// Empirical dry cell weight per OD600 unit, g/L
pub const DCW_PER_OD: f64 = 0.4;

/// OD600 corrected for sample dilution
pub fn corrected_density(raw: f64, dilution_factor: f64) -> Result<f64> {
    if !raw.is_finite() || raw < 0.0 {
        return Err(Error::validation("od_raw", format!("must be >= 0, got {}", raw)));
    }
    if !dilution_factor.is_finite() || dilution_factor < 1.0 {
        return Err(Error::validation(
            "dilution_factor",
            format!("must be >= 1, got {}", dilution_factor),
        ));
    }
    Ok(raw * dilution_factor)
}

/// Dry cell weight in g/L from filter weights (g) and filtered volume (mL)
///
/// `Ok(None)` when any input is absent. The dried filter must weigh more than the
/// pre-weighed (tare) filter.
pub fn dry_cell_weight_g_per_l(
    wet_weight_g: Option<f64>,
    dry_weight_g: Option<f64>,
    filtered_volume_ml: Option<f64>,
) -> Result<Option<f64>> {
    let (wet, dry, volume_ml) = match (wet_weight_g, dry_weight_g, filtered_volume_ml) {
        (Some(w), Some(d), Some(v)) => (w, d, v),
        _ => return Ok(None),
    };

    if !(dry > wet) {
        return Err(Error::validation(
            "dry_weight_g",
            format!("dry weight {} must exceed wet weight {}", dry, wet),
        ));
    }
    if !(volume_ml > 0.0) {
        return Err(Error::validation(
            "filtered_volume_ml",
            format!("must be > 0, got {}", volume_ml),
        ));
    }

    Ok(Some((dry - wet) / (volume_ml / 1000.0)))
}

/// pH electrode slope as percent of the ideal slope
///
/// `None` when both buffers are equal (single-point check).
pub fn ph_slope_percent(
    buffer_low: f64,
    buffer_high: f64,
    reading_low_mv: f64,
    reading_high_mv: f64,
    ideal_slope_mv: f64,
) -> Option<f64> {
    let delta_mv = reading_high_mv - reading_low_mv;
    let delta_ph = buffer_high - buffer_low;
    if delta_ph == 0.0 {
        return None;
    }
    Some((delta_mv / delta_ph).abs() / ideal_slope_mv * 100.0)
}

/// DCW estimate from corrected OD600; for cross-validation only
pub fn dcw_estimate_from_density(corrected_density: f64, factor: f64) -> f64 {
    corrected_density * factor
}

/// Signed deviation of `measured` from `estimate`, percent
pub fn percent_deviation(measured: f64, estimate: f64) -> Option<f64> {
    if estimate == 0.0 {
        return None;
    }
    Some((measured - estimate) / estimate * 100.0)
}

/// Reading minus reference
pub fn drift(reading: f64, reference: f64) -> f64 {
    reading - reference
}

/// Absolute span error relative to the reference, percent
pub fn span_error_percent(reading: f64, reference: f64) -> Option<f64> {
    percent_deviation(reading, reference).map(f64::abs)
}
