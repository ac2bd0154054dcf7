use std::collections::HashMap;

use energy_client::{db::reading_queries, domain::NewReading};
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::{
    pipeline::PipelineError,
    validation::{HistoricalSeries, HistoryPoint},
};

/// Where screening gets the prior readings of a meter from.
#[async_trait::async_trait]
pub trait HistoryProvider: Send + Sync {
    /// The newest `limit` values of `meter_id` strictly before `before`, oldest first.
    async fn window(&self, meter_id: &str, before: OffsetDateTime, limit: usize)
        -> Result<HistoricalSeries, PipelineError>;

    /// Make a screened reading visible to later windows of the same run.
    async fn remember(&self, reading: &NewReading);
}

/// Per-meter history held in memory. Used for dry-run imports and as the
/// write-behind buffer of [`PgHistory`].
#[derive(Default)]
pub struct InMemoryHistory {
    series: Mutex<HashMap<String, HistoricalSeries>>,
    cap: Option<usize>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `cap` points per meter.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            series: Mutex::default(),
            cap: Some(cap),
        }
    }

    pub async fn seed(&self, readings: impl IntoIterator<Item = NewReading>) {
        for r in readings {
            self.remember(&r).await;
        }
    }
}

#[async_trait::async_trait]
impl HistoryProvider for InMemoryHistory {
    async fn window(
        &self,
        meter_id: &str,
        before: OffsetDateTime,
        limit: usize,
    ) -> Result<HistoricalSeries, PipelineError> {
        let guard = self.series.lock().await;
        Ok(guard
            .get(meter_id)
            .map(|s| s.window(before, limit))
            .unwrap_or_default())
    }

    async fn remember(&self, reading: &NewReading) {
        let Some(value) = reading.value else {
            return;
        };

        let mut guard = self.series.lock().await;
        let entry = guard.entry(reading.meter_id.clone()).or_default();
        entry.insert(HistoryPoint { ts: reading.ts, value });
        if let Some(cap) = self.cap {
            entry.truncate_front(cap);
        }
    }
}

/// History from the `readings` table, merged with readings screened in this
/// process that may not have been flushed yet.
pub struct PgHistory {
    pool: PgPool,
    pending: InMemoryHistory,
}

impl PgHistory {
    pub fn new(pool: PgPool, history_window: usize) -> Self {
        Self {
            pool,
            pending: InMemoryHistory::with_cap(history_window.max(1)),
        }
    }
}

#[async_trait::async_trait]
impl HistoryProvider for PgHistory {
    async fn window(
        &self,
        meter_id: &str,
        before: OffsetDateTime,
        limit: usize,
    ) -> Result<HistoricalSeries, PipelineError> {
        let rows = reading_queries::history_window(&self.pool, meter_id, before, limit as i64)
            .await
            .map_err(|e| PipelineError::Transform(format!("failed to load history for meter '{meter_id}': {e}")))?;

        let pending = self.pending.window(meter_id, before, limit).await?;
        Ok(HistoricalSeries::from_readings(&rows).merge(pending).last(limit))
    }

    async fn remember(&self, reading: &NewReading) {
        self.pending.remember(reading).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::datetime, Duration};

    fn reading(meter: &str, hour: i64, value: Option<f64>) -> NewReading {
        NewReading::new(meter, datetime!(2024-04-01 00:00:00 UTC) + Duration::hours(hour), value)
    }

    #[tokio::test]
    async fn window_is_per_meter_and_strictly_before() {
        let h = InMemoryHistory::new();
        h.seed(vec![
            reading("a", 0, Some(1.0)),
            reading("a", 1, Some(2.0)),
            reading("b", 1, Some(50.0)),
            reading("a", 2, Some(3.0)),
        ])
        .await;

        let w = h.window("a", reading("a", 2, None).ts, 10).await.unwrap();
        assert_eq!(w.values(), vec![1.0, 2.0]);
        assert!(h.window("c", reading("c", 9, None).ts, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_values_are_not_remembered() {
        let h = InMemoryHistory::new();
        h.remember(&reading("a", 0, None)).await;
        assert!(h.window("a", reading("a", 5, None).ts, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cap_and_limit_keep_the_newest_points() {
        let h = InMemoryHistory::with_cap(3);
        h.seed((0..6).map(|i| reading("a", i, Some(i as f64)))).await;

        let later = reading("a", 100, None).ts;
        assert_eq!(h.window("a", later, 10).await.unwrap().values(), vec![3.0, 4.0, 5.0]);
        assert_eq!(h.window("a", later, 2).await.unwrap().values(), vec![4.0, 5.0]);
    }

    #[tokio::test]
    async fn long_single_meter_run_stays_bounded() {
        let h = InMemoryHistory::with_cap(30);
        for i in 0..20_000 {
            let r = reading("a", i, Some((i % 7) as f64));
            let w = h.window("a", r.ts, 30).await.unwrap();
            assert!(w.len() <= 30);
            h.remember(&r).await;
        }

        let w = h.window("a", reading("a", 20_000, None).ts, 30).await.unwrap();
        assert_eq!(w.len(), 30);
        assert_eq!(w.points()[0].ts, reading("a", 19_970, None).ts);
    }
}
