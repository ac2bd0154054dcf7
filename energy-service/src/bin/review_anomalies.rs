use std::env;

use anyhow::{anyhow, bail, Result};
use energy_client::db::anomaly_queries;
use energy_service::{config::AppConfig, observability, validation::format_percentage};

const USAGE: &str = "usage: review_anomalies list [meter_id] | correct <id> <value> <comment> | dismiss <id> <comment>";
const LIST_LIMIT: i64 = 200;

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse().map_err(|e| anyhow!("invalid anomaly id '{raw}': {e}"))
}

/// Review open anomalies: list them, correct the underlying reading, or dismiss.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else { bail!(USAGE) };

    let cfg = AppConfig::load()?;
    let pool = cfg.database()?.connect().await?;

    match (command.as_str(), &args[1..]) {
        ("list", rest) => {
            let meter_id = rest.first().map(String::as_str);
            let anomalies = anomaly_queries::open_anomalies(&pool, meter_id, LIST_LIMIT).await?;
            for a in &anomalies {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    a.id,
                    a.meter_id,
                    a.ts,
                    a.kind,
                    a.delta_pct.map(format_percentage).unwrap_or_default(),
                );
            }
            tracing::info!(count = anomalies.len(), "open anomalies listed");
        }
        ("correct", [id, value, comment @ ..]) if !comment.is_empty() => {
            let id = parse_id(id)?;
            let value: f64 = value.parse().map_err(|e| anyhow!("invalid value '{value}': {e}"))?;
            let comment = comment.join(" ");
            anomaly_queries::apply_correction(&pool, id, value, &comment).await?;
            tracing::info!(anomaly_id = id, corrected_value = value, "anomaly corrected");
        }
        ("dismiss", [id, comment @ ..]) if !comment.is_empty() => {
            let id = parse_id(id)?;
            anomaly_queries::dismiss_anomaly(&pool, id, &comment.join(" ")).await?;
            tracing::info!(anomaly_id = id, "anomaly dismissed");
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
