use std::sync::Arc;

use anyhow::Result;
use energy_service::{
    config::AppConfig,
    metrics_server, observability,
    pipeline::Pipeline,
    sinks::PostgresReadingSink,
    sources::HttpReadingSource,
    transform::{self, PgHistory, PgMeterDirectory},
    validation::ScreenedReading,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let readings_cfg = cfg.readings()?;
    let pool = cfg.database()?.connect().await?;

    let history = Arc::new(PgHistory::new(pool.clone(), cfg.screening.history_window));
    let meters = Arc::new(PgMeterDirectory::new(pool.clone()));
    let sink = PostgresReadingSink::new(
        pool,
        readings_cfg.sink.batch_size,
        readings_cfg.sink.max_retries,
        Duration::from_millis(readings_cfg.sink.retry_backoff_ms),
    );
    let source = HttpReadingSource::new(
        &readings_cfg.source.http_bind_addr,
        readings_cfg.source.channel_capacity,
        readings_cfg.source.auth_bearer_token.clone(),
    )
    .await?;

    let pipeline: Pipeline<_, ScreenedReading, _> = Pipeline {
        source,
        transforms: transform::reading_transforms(history, Some(meters), &cfg.screening),
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
