use std::env;

use anyhow::{anyhow, bail, Result};
use energy_client::{db::emission_factor_queries, domain::NewEmissionFactor};
use energy_service::{config::AppConfig, observability};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const USAGE: &str = "usage: emission_factors list | set <energy_type> <kg_co2e_per_unit> <valid_from_rfc3339> \
                     | emissions <energy_type> <quantity> [at_rfc3339]";

fn parse_ts(raw: &str, what: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| anyhow!("invalid {what} '{raw}': {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let cfg = AppConfig::load()?;
    let pool = cfg.database()?.connect().await?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["list"] => {
            let now = OffsetDateTime::now_utc();
            for f in emission_factor_queries::list_emission_factors(&pool).await? {
                let until = match f.valid_to {
                    Some(ts) => ts.format(&Rfc3339)?,
                    None => "open".to_string(),
                };
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    f.id,
                    f.energy_type,
                    f.kg_co2e_per_unit,
                    f.valid_from.format(&Rfc3339)?,
                    until,
                    if f.is_valid_at(now) { "active" } else { "" }
                );
            }
        }
        ["set", energy_type, factor, valid_from] => {
            let kg_co2e_per_unit: f64 = factor
                .parse()
                .map_err(|e| anyhow!("invalid factor '{factor}': {e}"))?;
            if !kg_co2e_per_unit.is_finite() || kg_co2e_per_unit < 0.0 {
                bail!("factor must be a non-negative number");
            }
            let valid_from = parse_ts(valid_from, "valid_from")?;

            let stored = emission_factor_queries::upsert_emission_factor(
                &pool,
                &NewEmissionFactor {
                    energy_type: energy_type.to_string(),
                    kg_co2e_per_unit,
                    valid_from,
                },
            )
            .await?;
            tracing::info!(id = stored.id, energy_type = %stored.energy_type, "emission factor stored");
        }
        ["emissions", energy_type, quantity, rest @ ..] if rest.len() <= 1 => {
            let quantity: f64 = quantity
                .parse()
                .map_err(|e| anyhow!("invalid quantity '{quantity}': {e}"))?;
            if !quantity.is_finite() {
                bail!("quantity must be a finite number");
            }
            let at = match rest.first() {
                Some(raw) => parse_ts(raw, "timestamp")?,
                None => OffsetDateTime::now_utc(),
            };

            let Some(factor) = emission_factor_queries::active_emission_factor(&pool, energy_type, at).await? else {
                bail!("no emission factor for '{energy_type}' at {}", at.format(&Rfc3339)?);
            };
            let kg = factor.emissions_kg(quantity);

            tracing::info!(
                energy_type = %energy_type,
                quantity,
                factor_id = factor.id,
                kg_co2e = kg,
                "emissions computed"
            );
            println!("{kg}\tkg CO2e\t(factor {} = {} kg/unit)", factor.id, factor.kg_co2e_per_unit);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
