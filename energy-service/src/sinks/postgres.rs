use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use energy_client::{
    db::{anomaly_queries, reading_queries},
    domain::{NewAnomaly, NewReading, ReadingKey},
};
use futures::StreamExt;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    validation::ScreenedReading,
};

/// Writes screened readings to the `readings` table and their categorized
/// anomalies to `anomalies`, in batches.
pub struct PostgresReadingSink {
    pool: PgPool,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PostgresReadingSink {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<ScreenedReading>]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let (readings, anomalies) = batch_rows(batch);

        let mut attempt: u32 = 0;
        loop {
            match self.write(&readings, &anomalies).await {
                Ok((written, flagged)) => {
                    metrics::counter!("readings_ingested_total").increment(written);
                    metrics::counter!("anomalies_recorded_total").increment(flagged);
                    if written < readings.len() as u64 {
                        tracing::debug!(
                            skipped = readings.len() as u64 - written,
                            "readings already present, skipped"
                        );
                    }

                    // Approximate end-to-end latency from earliest received_at to now.
                    if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
                        if let Ok(dur) = SystemTime::now().duration_since(min_received) {
                            metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
                        }
                    }

                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "reading sink flush failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "reading sink flush failed, giving up");
                    metrics::counter!("reading_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    /// One transaction per batch. Anomalies are only recorded for readings
    /// this batch actually wrote.
    async fn write(&self, readings: &[NewReading], anomalies: &[NewAnomaly]) -> anyhow::Result<(u64, u64)> {
        let mut tx = self.pool.begin().await?;

        let written = reading_queries::insert_readings(&mut *tx, readings).await?;
        let anomalies = anomalies_of_written(anomalies, &written);
        let flagged = anomaly_queries::insert_anomalies(&mut *tx, &anomalies).await?;

        tx.commit().await?;
        Ok((written.len() as u64, flagged))
    }
}

/// Readings and anomalies of a batch, keeping the first envelope per
/// `(meter_id, ts)`.
fn batch_rows(batch: &[Envelope<ScreenedReading>]) -> (Vec<NewReading>, Vec<NewAnomaly>) {
    let mut seen = HashSet::new();
    let mut readings = Vec::with_capacity(batch.len());
    let mut anomalies = Vec::new();

    for env in batch {
        if !seen.insert(env.payload.reading.key()) {
            continue;
        }
        readings.push(env.payload.reading.clone());
        anomalies.extend(env.payload.to_anomaly());
    }
    (readings, anomalies)
}

fn anomalies_of_written(anomalies: &[NewAnomaly], written: &[ReadingKey]) -> Vec<NewAnomaly> {
    let written: HashSet<(&str, OffsetDateTime)> = written.iter().map(|k| (k.meter_id.as_str(), k.ts)).collect();
    anomalies
        .iter()
        .filter(|a| written.contains(&(a.meter_id.as_str(), a.ts)))
        .cloned()
        .collect()
}

#[async_trait::async_trait]
impl Sink<ScreenedReading> for PostgresReadingSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<ScreenedReading>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut buffer: Vec<Envelope<ScreenedReading>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for PostgresReadingSink");
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await?;
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            self.flush_batch(&buffer).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::AnomalyKind;
    use time::macros::datetime;

    use crate::validation::{classify, HistoricalSeries};

    fn screened(meter: &str, value: Option<f64>) -> Envelope<ScreenedReading> {
        let reading = NewReading::new(meter, datetime!(2024-03-01 00:00:00 UTC), value);
        let screening = classify(reading.value, reading.ts, &HistoricalSeries::default(), 3);
        Envelope::new(ScreenedReading {
            reading,
            screening: Some(screening),
        })
    }

    #[test]
    fn batch_keeps_first_reading_per_meter_and_ts() {
        let batch = vec![screened("m", None), screened("m", Some(105.0)), screened("n", Some(1.0))];
        let (readings, anomalies) = batch_rows(&batch);

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].value, None);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::Missing);
    }

    #[test]
    fn anomalies_follow_written_readings_only() {
        let batch = vec![screened("m", None), screened("already-stored", None)];
        let (readings, anomalies) = batch_rows(&batch);
        let written = vec![readings[0].key()];

        let kept = anomalies_of_written(&anomalies, &written);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].meter_id, "m");
    }
}
