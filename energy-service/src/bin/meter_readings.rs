use std::env;

use anyhow::{anyhow, bail, Result};
use energy_client::db::reading_queries;
use energy_service::{config::AppConfig, observability};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Print a meter's stored readings over `[start, end)`.
///
/// Usage:
///   meter_readings <meter_id> <start_rfc3339> <end_rfc3339>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        bail!("usage: meter_readings <meter_id> <start_rfc3339> <end_rfc3339>");
    }
    let meter_id = &args[1];
    let start = OffsetDateTime::parse(&args[2], &Rfc3339).map_err(|e| anyhow!("invalid start '{}': {e}", args[2]))?;
    let end = OffsetDateTime::parse(&args[3], &Rfc3339).map_err(|e| anyhow!("invalid end '{}': {e}", args[3]))?;
    if end <= start {
        bail!("end must be after start");
    }

    let cfg = AppConfig::load()?;
    let pool = cfg.database()?.connect().await?;

    let readings = reading_queries::load_profile(&pool, meter_id, start, end).await?;
    tracing::info!(meter_id = %meter_id, count = readings.len(), "readings loaded");

    for r in &readings {
        println!(
            "{}\t{}\t{}",
            r.ts.format(&Rfc3339)?,
            r.value.map_or_else(|| "-".to_string(), |v| v.to_string()),
            r.source_system.as_deref().unwrap_or(""),
        );
    }

    Ok(())
}
