use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::{EmissionFactor, NewEmissionFactor};

pub async fn list_emission_factors(pool: &PgPool) -> Result<Vec<EmissionFactor>> {
    let rows = sqlx::query_as::<_, EmissionFactor>(
        r#"
        SELECT id, energy_type, kg_co2e_per_unit, valid_from, valid_to
        FROM emission_factors
        ORDER BY energy_type, valid_from
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Insert a new factor and close the currently open one for the same energy type.
pub async fn upsert_emission_factor(pool: &PgPool, factor: &NewEmissionFactor) -> Result<EmissionFactor> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE emission_factors
        SET valid_to = $2
        WHERE energy_type = $1
          AND valid_to IS NULL
          AND valid_from < $2
        "#,
    )
    .bind(&factor.energy_type)
    .bind(factor.valid_from)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, EmissionFactor>(
        r#"
        INSERT INTO emission_factors (energy_type, kg_co2e_per_unit, valid_from)
        VALUES ($1, $2, $3)
        ON CONFLICT (energy_type, valid_from)
        DO UPDATE SET kg_co2e_per_unit = EXCLUDED.kg_co2e_per_unit
        RETURNING id, energy_type, kg_co2e_per_unit, valid_from, valid_to
        "#,
    )
    .bind(&factor.energy_type)
    .bind(factor.kg_co2e_per_unit)
    .bind(factor.valid_from)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

pub async fn active_emission_factor(
    pool: &PgPool,
    energy_type: &str,
    at: OffsetDateTime,
) -> Result<Option<EmissionFactor>> {
    let row = sqlx::query_as::<_, EmissionFactor>(
        r#"
        SELECT id, energy_type, kg_co2e_per_unit, valid_from, valid_to
        FROM emission_factors
        WHERE energy_type = $1
          AND valid_from <= $2
          AND (valid_to IS NULL OR valid_to > $2)
        ORDER BY valid_from DESC
        LIMIT 1
        "#,
    )
    .bind(energy_type)
    .bind(at)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
