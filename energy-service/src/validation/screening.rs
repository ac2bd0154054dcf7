use energy_client::domain::{AnomalyKind, NewAnomaly, NewReading};
use serde::Serialize;
use time::OffsetDateTime;

use super::{
    history::HistoricalSeries,
    thresholds::{self, ThresholdCheck},
};

/// Anomaly kind and deviation for one reading. Not persisted as such.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyClassification {
    pub kind: Option<AnomalyKind>,
    pub delta_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Screening {
    pub check: ThresholdCheck,
    pub classification: AnomalyClassification,
    pub needs_attention: bool,
    pub history_len: usize,
}

/// Screen one reading against its meter's history.
///
/// The flatness window is the newest `flat_window - 1` historical points plus
/// the reading itself. A meter with no history is only judged on missing and
/// flat values.
pub fn classify(value: Option<f64>, ts: OffsetDateTime, series: &HistoricalSeries, flat_window: usize) -> Screening {
    let historical = series.values();
    let check = thresholds::check_thresholds(value, &historical);
    let mean = thresholds::mean(&historical);

    let window = series.last(flat_window.saturating_sub(1));
    let mut readings = window.values();
    let mut timestamps = window.timestamps();
    if let Some(v) = value {
        readings.push(v);
        timestamps.push(ts);
    }

    let kind = thresholds::anomaly_type(value, mean.unwrap_or(0.0), &readings, &timestamps);
    let needs_attention = match mean {
        Some(m) => thresholds::has_issue(value, m, &readings, &timestamps),
        None => thresholds::is_missing(value) || thresholds::is_flat(&readings, &timestamps),
    };
    let delta_pct = match (value, mean) {
        (Some(v), Some(m)) => Some(thresholds::percentage_difference(v, m)),
        _ => None,
    };

    Screening {
        check,
        classification: AnomalyClassification { kind, delta_pct },
        needs_attention,
        history_len: series.len(),
    }
}

/// Pipeline payload: a reading plus its screening once `ThresholdScreening` ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenedReading {
    pub reading: NewReading,
    pub screening: Option<Screening>,
}

impl ScreenedReading {
    pub fn unscreened(reading: NewReading) -> Self {
        Self { reading, screening: None }
    }

    pub fn anomaly_kind(&self) -> Option<AnomalyKind> {
        self.screening.as_ref().and_then(|s| s.classification.kind)
    }

    /// The anomaly record to persist, if the reading was categorized.
    pub fn to_anomaly(&self) -> Option<NewAnomaly> {
        let screening = self.screening.as_ref()?;
        let kind = screening.classification.kind?;
        Some(NewAnomaly {
            meter_id: self.reading.meter_id.clone(),
            ts: self.reading.ts,
            kind,
            delta_pct: screening.classification.delta_pct,
        })
    }
}

impl From<NewReading> for ScreenedReading {
    fn from(reading: NewReading) -> Self {
        Self::unscreened(reading)
    }
}
