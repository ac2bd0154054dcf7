//! Classify a meter's stored readings, each against the readings before it.

use energy_client::domain::{AnomalyKind, Reading};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    config::ScreeningConfig,
    validation::{classify, format_percentage, HistoricalSeries},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagPreviewRow {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub value: Option<f64>,
    pub kind: Option<AnomalyKind>,
    pub delta: Option<String>,
    pub needs_attention: bool,
    pub message: Option<&'static str>,
}

/// Screen the newest `limit` readings of an ascending series.
///
/// Older readings only serve as history. Each row is compared against the
/// `history_window` newest readings before it that carry a value; gaps do not
/// shrink the window.
pub fn preview_readings(readings: &[Reading], limit: usize, screening: &ScreeningConfig) -> Vec<TagPreviewRow> {
    let start = readings.len().saturating_sub(limit);
    let valued = HistoricalSeries::from_readings(readings);

    readings[start..]
        .iter()
        .map(|reading| {
            let series = valued.window(reading.ts, screening.history_window);
            let s = classify(reading.value, reading.ts, &series, screening.flat_window);

            TagPreviewRow {
                ts: reading.ts,
                value: reading.value,
                kind: s.classification.kind,
                delta: s.classification.delta_pct.map(format_percentage),
                needs_attention: s.needs_attention,
                message: s.check.message,
            }
        })
        .collect()
}
