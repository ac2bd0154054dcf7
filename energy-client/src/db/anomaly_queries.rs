use anyhow::{bail, Result};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};

use crate::domain::{Anomaly, AnomalyStatus, NewAnomaly};

pub async fn insert_anomalies<'e, E>(executor: E, anomalies: &[NewAnomaly]) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    if anomalies.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO anomalies (meter_id, ts, kind, delta_pct, status) ");
    builder.push_values(anomalies, |mut b, a| {
        b.push_bind(&a.meter_id)
            .push_bind(a.ts)
            .push_bind(a.kind.as_str())
            .push_bind(a.delta_pct)
            .push_bind(AnomalyStatus::Open.as_str());
    });
    builder.push(" ON CONFLICT (meter_id, ts, kind) DO NOTHING");

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected())
}

/// Open anomalies, newest first, optionally restricted to one meter.
pub async fn open_anomalies(pool: &PgPool, meter_id: Option<&str>, limit: i64) -> Result<Vec<Anomaly>> {
    let rows = sqlx::query_as::<_, Anomaly>(
        r#"
        SELECT id, meter_id, ts, kind, delta_pct, status, comment, corrected_value
        FROM anomalies
        WHERE status = 'open'
          AND ($1::TEXT IS NULL OR meter_id = $1)
        ORDER BY ts DESC
        LIMIT $2
        "#,
    )
    .bind(meter_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Overwrite the reading behind an open anomaly and close the anomaly as corrected.
pub async fn apply_correction(pool: &PgPool, anomaly_id: i64, corrected_value: f64, comment: &str) -> Result<()> {
    if !corrected_value.is_finite() {
        bail!("corrected value must be a finite number");
    }

    let mut tx = pool.begin().await?;

    let anomaly = sqlx::query_as::<_, Anomaly>(
        r#"
        SELECT id, meter_id, ts, kind, delta_pct, status, comment, corrected_value
        FROM anomalies
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(anomaly_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(anomaly) = anomaly else {
        bail!("anomaly {anomaly_id} not found");
    };
    if anomaly.status()? != AnomalyStatus::Open {
        bail!("anomaly {anomaly_id} is already {}", anomaly.status);
    }

    sqlx::query("UPDATE readings SET value = $1 WHERE meter_id = $2 AND ts = $3")
        .bind(corrected_value)
        .bind(&anomaly.meter_id)
        .bind(anomaly.ts)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE anomalies SET status = $1, corrected_value = $2, comment = $3 WHERE id = $4")
        .bind(AnomalyStatus::Corrected.as_str())
        .bind(corrected_value)
        .bind(comment)
        .bind(anomaly_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Close an open anomaly without touching the reading.
pub async fn dismiss_anomaly(pool: &PgPool, anomaly_id: i64, comment: &str) -> Result<()> {
    let result = sqlx::query("UPDATE anomalies SET status = $1, comment = $2 WHERE id = $3 AND status = 'open'")
        .bind(AnomalyStatus::Dismissed.as_str())
        .bind(comment)
        .bind(anomaly_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        bail!("no open anomaly with id {anomaly_id}");
    }
    Ok(())
}
