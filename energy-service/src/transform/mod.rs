pub mod history;
pub mod meters;

use std::sync::Arc;

use time::macros::datetime;

use crate::{
    config::ScreeningConfig,
    pipeline::{Envelope, PipelineError, Transform},
    validation::{classify, ScreenedReading},
};

pub use history::{HistoryProvider, InMemoryHistory, PgHistory};
pub use meters::{KnownMeterCheck, MeterDirectory, PgMeterDirectory};

/// Structural validation of a reading before it is screened.
///
/// Rules:
/// - meter_id must be non-empty.
/// - value, when present, must be finite and non-negative.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_reading(env: Envelope<ScreenedReading>) -> Result<Envelope<ScreenedReading>, PipelineError> {
    let r = &env.payload.reading;

    if r.meter_id.trim().is_empty() {
        return Err(PipelineError::Transform("meter_id must not be empty".to_string()));
    }

    if let Some(v) = r.value {
        if !v.is_finite() {
            return Err(PipelineError::Transform(format!(
                "value for meter '{}' must be a finite number",
                r.meter_id
            )));
        }
        if v < 0.0 {
            return Err(PipelineError::Transform(format!(
                "value for meter '{}' must be non-negative",
                r.meter_id
            )));
        }
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if r.ts < min_ts || r.ts > max_ts {
        return Err(PipelineError::Transform(format!(
            "timestamp for meter '{}' out of allowed range",
            r.meter_id
        )));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform<ScreenedReading, ScreenedReading> for ReadingValidation {
    async fn apply(&self, input: Envelope<ScreenedReading>) -> Result<Envelope<ScreenedReading>, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_reading_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

/// Validation, the meter check when a directory is given, then screening.
///
/// Unknown meters are dropped before screening so they never enter history.
pub fn reading_transforms(
    history: Arc<dyn HistoryProvider>,
    meters: Option<Arc<dyn MeterDirectory>>,
    screening: &ScreeningConfig,
) -> Vec<Arc<dyn Transform<ScreenedReading, ScreenedReading> + Send + Sync>> {
    let mut transforms: Vec<Arc<dyn Transform<ScreenedReading, ScreenedReading> + Send + Sync>> =
        vec![Arc::new(ReadingValidation)];
    if let Some(meters) = meters {
        transforms.push(Arc::new(KnownMeterCheck::new(meters)));
    }
    transforms.push(Arc::new(ThresholdScreening::new(
        history,
        screening.history_window,
        screening.flat_window,
    )));
    transforms
}

/// Classifies each reading against the preceding readings of its meter.
pub struct ThresholdScreening {
    history: Arc<dyn HistoryProvider>,
    history_window: usize,
    flat_window: usize,
}

impl ThresholdScreening {
    pub fn new(history: Arc<dyn HistoryProvider>, history_window: usize, flat_window: usize) -> Self {
        Self {
            history,
            history_window,
            flat_window,
        }
    }
}

#[async_trait::async_trait]
impl Transform<ScreenedReading, ScreenedReading> for ThresholdScreening {
    async fn apply(&self, input: Envelope<ScreenedReading>) -> Result<Envelope<ScreenedReading>, PipelineError> {
        let mut env = input;
        let reading = &env.payload.reading;

        let series = self
            .history
            .window(&reading.meter_id, reading.ts, self.history_window)
            .await?;
        let screening = classify(reading.value, reading.ts, &series, self.flat_window);

        if let Some(kind) = screening.classification.kind {
            metrics::counter!("screening_anomalies_total", "kind" => kind.as_str()).increment(1);
            tracing::info!(
                meter_id = %reading.meter_id,
                ts = %reading.ts,
                kind = %kind,
                delta_pct = ?screening.classification.delta_pct,
                "reading flagged as anomaly"
            );
        } else if screening.check.is_out_of_threshold() {
            metrics::counter!("screening_out_of_threshold_total").increment(1);
            tracing::debug!(
                meter_id = %reading.meter_id,
                ts = %reading.ts,
                delta_pct = ?screening.check.delta,
                "reading outside threshold band"
            );
        }

        self.history.remember(reading).await;
        env.payload.screening = Some(screening);
        Ok(env)
    }
}
