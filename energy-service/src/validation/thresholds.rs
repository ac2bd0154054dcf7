//! Threshold and anomaly rules for meter readings.
//!
//! Everything here is a pure function over a value, a historical mean and an
//! optional window of prior readings. Nothing allocates beyond the returned
//! values and nothing panics on NaN input: comparisons against NaN are false
//! and percentage math yields NaN.

use energy_client::domain::AnomalyKind;
use serde::Serialize;
use time::{Duration, OffsetDateTime};

/// A value at or above `mean * SPIKE_RATIO` is a spike (+40%).
pub const SPIKE_RATIO: f64 = 1.4;
/// Lower edge of the tolerated band (-15%).
pub const LOWER_THRESHOLD_RATIO: f64 = 0.85;
/// Upper edge of the tolerated band (+15%).
pub const UPPER_THRESHOLD_RATIO: f64 = 1.15;
/// Minimum span of identical readings before a meter counts as flat.
pub const FLAT_MIN_SPAN: Duration = Duration::hours(48);

pub const OUT_OF_THRESHOLD_MESSAGE: &str = "Out-of-threshold value";

/// `value >= mean * 1.4`. A mean of zero or below never produces a spike.
pub fn is_spike(value: f64, historical_mean: f64) -> bool {
    historical_mean > 0.0 && value >= historical_mean * SPIKE_RATIO
}

/// Absence only. Zero is a real reading.
pub fn is_missing(value: Option<f64>) -> bool {
    value.is_none()
}

/// Strictly outside ±15% of the mean.
pub fn is_out_of_threshold(value: f64, historical_mean: f64) -> bool {
    value < historical_mean * LOWER_THRESHOLD_RATIO || value > historical_mean * UPPER_THRESHOLD_RATIO
}

/// All readings equal and the window spans at least 48 hours.
///
/// `readings` and `timestamps` are parallel and ascending; neither is checked.
pub fn is_flat(readings: &[f64], timestamps: &[OffsetDateTime]) -> bool {
    if readings.len() < 2 || timestamps.len() < 2 {
        return false;
    }

    let first = readings[0];
    if !readings.iter().all(|&r| r == first) {
        return false;
    }

    match (timestamps.first(), timestamps.last()) {
        (Some(&start), Some(&end)) => end - start >= FLAT_MIN_SPAN,
        _ => false,
    }
}

/// Signed deviation from the mean in percent; 0 when the mean is 0.
pub fn percentage_difference(value: f64, mean: f64) -> f64 {
    if mean == 0.0 {
        return 0.0;
    }
    ((value - mean) / mean) * 100.0
}

/// `+20.5%`, `-15.3%`, `+0.0%`.
pub fn format_percentage(percentage: f64) -> String {
    if percentage >= 0.0 {
        // abs() folds -0.0 into +0.0
        format!("+{:.1}%", percentage.abs())
    } else {
        format!("{percentage:.1}%")
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Categorized anomaly, checked in priority order MISSING, SPIKE, FLAT.
///
/// Out-of-threshold values are not a category; see [`has_issue`].
pub fn anomaly_type(
    value: Option<f64>,
    historical_mean: f64,
    readings: &[f64],
    timestamps: &[OffsetDateTime],
) -> Option<AnomalyKind> {
    let Some(value) = value else {
        return Some(AnomalyKind::Missing);
    };

    if is_spike(value, historical_mean) {
        Some(AnomalyKind::Spike)
    } else if is_flat(readings, timestamps) {
        Some(AnomalyKind::Flat)
    } else {
        None
    }
}

/// Whether the reading needs attention at all: any anomaly kind or a plain
/// threshold violation.
pub fn has_issue(value: Option<f64>, historical_mean: f64, readings: &[f64], timestamps: &[OffsetDateTime]) -> bool {
    match value {
        None => true,
        Some(v) => {
            is_spike(v, historical_mean) || is_out_of_threshold(v, historical_mean) || is_flat(readings, timestamps)
        }
    }
}

/// Outcome of [`check_thresholds`].
///
/// Out-of-threshold values carry a delta and a message but are not anomalies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdCheck {
    pub is_anomaly: bool,
    #[serde(rename = "type")]
    pub kind: Option<AnomalyKind>,
    pub delta: Option<f64>,
    pub message: Option<&'static str>,
}

impl ThresholdCheck {
    fn clear() -> Self {
        Self {
            is_anomaly: false,
            kind: None,
            delta: None,
            message: None,
        }
    }

    pub fn is_out_of_threshold(&self) -> bool {
        !self.is_anomaly && self.message.is_some()
    }
}

pub fn check_thresholds(value: Option<f64>, historical_values: &[f64]) -> ThresholdCheck {
    let Some(value) = value else {
        return ThresholdCheck {
            is_anomaly: true,
            kind: Some(AnomalyKind::Missing),
            ..ThresholdCheck::clear()
        };
    };

    let Some(mean) = mean(historical_values) else {
        return ThresholdCheck::clear();
    };

    if is_spike(value, mean) {
        ThresholdCheck {
            is_anomaly: true,
            kind: Some(AnomalyKind::Spike),
            delta: Some(percentage_difference(value, mean)),
            message: None,
        }
    } else if is_out_of_threshold(value, mean) {
        ThresholdCheck {
            is_anomaly: false,
            kind: None,
            delta: Some(percentage_difference(value, mean)),
            message: Some(OUT_OF_THRESHOLD_MESSAGE),
        }
    } else {
        ThresholdCheck::clear()
    }
}
