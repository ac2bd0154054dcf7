use anyhow::Result;
use sqlx::PgPool;

use crate::domain::Meter;

pub async fn meter_by_pi_tag(pool: &PgPool, pi_tag: &str) -> Result<Option<Meter>> {
    let meter = sqlx::query_as::<_, Meter>(
        r#"
        SELECT meter_id, name, pi_tag, unit
        FROM meters
        WHERE pi_tag = $1
        "#,
    )
    .bind(pi_tag)
    .fetch_optional(pool)
    .await?;

    Ok(meter)
}

pub async fn meter_exists(pool: &PgPool, meter_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM meters WHERE meter_id = $1)")
        .bind(meter_id)
        .fetch_one(pool)
        .await?;

    Ok(exists)
}
