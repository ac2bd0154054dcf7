use anyhow::{bail, Result};
use energy_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::PostgresReadingSink,
    sources::ReadingNdjsonFileSource,
    transform::{self, PgHistory, PgMeterDirectory},
    validation::ScreenedReading,
};
use std::{env, sync::Arc, time::Duration};

/// Backfill the `readings` table from an NDJSON export.
///
/// Usage:
///   backfill_readings_ndjson <ndjson_file_path>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_readings_ndjson <ndjson_file_path>");
    }
    let file_path = &args[1];

    // ENERGY_CONFIG can point to a backfill-specific file.
    let cfg = AppConfig::load()?;
    let pool = cfg.database()?.connect().await?;
    let sink_cfg = cfg.readings.as_ref().map(|r| r.sink.clone()).unwrap_or_default();

    let sink = PostgresReadingSink::new(
        pool.clone(),
        sink_cfg.batch_size,
        sink_cfg.max_retries,
        Duration::from_millis(sink_cfg.retry_backoff_ms),
    );
    let meters = Arc::new(PgMeterDirectory::new(pool.clone()));
    let history = Arc::new(PgHistory::new(pool, cfg.screening.history_window));

    let pipeline: Pipeline<_, ScreenedReading, _> = Pipeline {
        source: ReadingNdjsonFileSource::new(file_path),
        transforms: transform::reading_transforms(history, Some(meters), &cfg.screening),
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
