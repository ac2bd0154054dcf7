use std::env;

use anyhow::{anyhow, bail, Result};
use energy_client::db::{meter_queries, reading_queries};
use energy_service::{config::AppConfig, observability, tag_preview};

const DEFAULT_LIMIT: usize = 48;

/// Show how the newest readings of a PI tag would be classified.
///
/// Usage:
///   preview_tag <pi_tag> [limit]
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: preview_tag <pi_tag> [limit]");
    }
    let pi_tag = &args[1];
    let limit = match args.get(2) {
        Some(raw) => raw.parse::<usize>().map_err(|e| anyhow!("invalid limit '{raw}': {e}"))?,
        None => DEFAULT_LIMIT,
    };

    let cfg = AppConfig::load()?;
    let pool = cfg.database()?.connect().await?;

    let meter = meter_queries::meter_by_pi_tag(&pool, pi_tag)
        .await?
        .ok_or_else(|| anyhow!("no meter is mapped to PI tag '{pi_tag}'"))?;

    let fetch = (limit + cfg.screening.history_window) as i64;
    let readings = reading_queries::recent_readings(&pool, &meter.meter_id, fetch).await?;
    let rows = tag_preview::preview_readings(&readings, limit, &cfg.screening);

    tracing::info!(
        pi_tag = %pi_tag,
        meter_id = %meter.meter_id,
        rows = rows.len(),
        flagged = rows.iter().filter(|r| r.needs_attention).count(),
        "tag preview"
    );

    println!("{} ({}) {}", meter.name, meter.meter_id, meter.unit.as_deref().unwrap_or(""));
    for row in &rows {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            row.ts,
            row.value.map_or_else(|| "-".to_string(), |v| v.to_string()),
            row.kind.map_or("", |k| k.as_str()),
            row.delta.as_deref().unwrap_or(""),
            row.message.unwrap_or(""),
        );
    }

    Ok(())
}
