use std::{collections::HashSet, sync::Arc};

use energy_client::db::meter_queries;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::{
    pipeline::{Envelope, PipelineError, Transform},
    validation::ScreenedReading,
};

/// Answers whether a meter id is registered.
#[async_trait::async_trait]
pub trait MeterDirectory: Send + Sync {
    async fn contains(&self, meter_id: &str) -> Result<bool, PipelineError>;
}

/// Meter lookups against the `meters` table.
///
/// Confirmed meters are cached for the life of the process. Unknown ids are
/// asked again each time, so a meter registered mid-run is picked up.
pub struct PgMeterDirectory {
    pool: PgPool,
    known: Mutex<HashSet<String>>,
}

impl PgMeterDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            known: Mutex::default(),
        }
    }
}

#[async_trait::async_trait]
impl MeterDirectory for PgMeterDirectory {
    async fn contains(&self, meter_id: &str) -> Result<bool, PipelineError> {
        if self.known.lock().await.contains(meter_id) {
            return Ok(true);
        }

        let exists = meter_queries::meter_exists(&self.pool, meter_id)
            .await
            .map_err(|e| PipelineError::Transform(format!("failed to look up meter '{meter_id}': {e}")))?;
        if exists {
            self.known.lock().await.insert(meter_id.to_string());
        }
        Ok(exists)
    }
}

/// Rejects readings of unregistered meters before they reach a sink, where
/// they would fail the whole batch.
pub struct KnownMeterCheck {
    meters: Arc<dyn MeterDirectory>,
}

impl KnownMeterCheck {
    pub fn new(meters: Arc<dyn MeterDirectory>) -> Self {
        Self { meters }
    }
}

#[async_trait::async_trait]
impl Transform<ScreenedReading, ScreenedReading> for KnownMeterCheck {
    async fn apply(&self, input: Envelope<ScreenedReading>) -> Result<Envelope<ScreenedReading>, PipelineError> {
        let meter_id = &input.payload.reading.meter_id;
        if self.meters.contains(meter_id).await? {
            return Ok(input);
        }

        metrics::counter!("validation_unknown_meter_total").increment(1);
        tracing::warn!(meter_id = %meter_id, "reading for unknown meter rejected");
        Err(PipelineError::Transform(format!("unknown meter '{meter_id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::NewReading;
    use time::macros::datetime;

    struct Registered(HashSet<&'static str>);

    #[async_trait::async_trait]
    impl MeterDirectory for Registered {
        async fn contains(&self, meter_id: &str) -> Result<bool, PipelineError> {
            Ok(self.0.contains(meter_id))
        }
    }

    fn env(meter: &str) -> Envelope<ScreenedReading> {
        Envelope::new(ScreenedReading::unscreened(NewReading::new(
            meter,
            datetime!(2024-03-01 00:00:00 UTC),
            Some(100.0),
        )))
    }

    #[tokio::test]
    async fn unknown_meter_is_a_row_error() {
        let check = KnownMeterCheck::new(Arc::new(Registered(HashSet::from(["known"]))));

        assert!(check.apply(env("known")).await.is_ok());
        let err = check.apply(env("typo-meter")).await.unwrap_err();
        assert!(matches!(&err, PipelineError::Transform(msg) if msg.contains("typo-meter")));
    }
}
