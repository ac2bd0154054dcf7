use std::{env, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use energy_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::{ImportPreviewSink, PostgresReadingSink},
    sources::ReadingCsvFileSource,
    transform::{self, InMemoryHistory, PgHistory, PgMeterDirectory},
    validation::ScreenedReading,
};

const USAGE: &str = "usage: import_readings <csv_or_dat_path> [--dry-run] [--delimiter <char>]";

/// Bulk import of meter readings from a CSV (or pipe-delimited .dat) file.
///
/// With `--dry-run` nothing is written: rows are screened against the earlier
/// rows of the same file and a JSON preview is printed.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let mut path = None;
    let mut dry_run = false;
    let mut delimiter = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--delimiter" => {
                let Some(d) = args.next() else { bail!(USAGE) };
                let &[byte] = d.as_bytes() else {
                    bail!("--delimiter must be a single ASCII character");
                };
                delimiter = Some(byte);
            }
            _ if path.is_none() => path = Some(arg),
            _ => bail!(USAGE),
        }
    }
    let Some(path) = path else { bail!(USAGE) };

    let cfg = AppConfig::load_or_default()?;

    let mut source = ReadingCsvFileSource::new(&path)
        .required_fields(cfg.import.required_fields.clone())
        .default_source(cfg.import.source_system.clone());
    if let Some(d) = delimiter {
        source = source.delimiter(d);
    }

    if dry_run {
        let sink = ImportPreviewSink::new(cfg.import.max_reported_errors);
        let preview = sink.handle();

        let pipeline: Pipeline<_, ScreenedReading, _> = Pipeline {
            source,
            transforms: transform::reading_transforms(
                Arc::new(InMemoryHistory::with_cap(cfg.screening.history_window)),
                None,
                &cfg.screening,
            ),
            sink,
        };
        pipeline.run().await?;

        let preview = preview.lock().await;
        tracing::info!(
            accepted = preview.rows_accepted,
            rejected = preview.rows_rejected,
            flagged = preview.flagged.len(),
            "import preview complete"
        );
        println!("{}", serde_json::to_string_pretty(&*preview)?);
        return Ok(());
    }

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
        source,
        transforms: transform::reading_transforms(history, Some(meters), &cfg.screening),
        sink,
    };
    pipeline.run().await?;

    tracing::info!(path = %path, "import finished");
    Ok(())
}
