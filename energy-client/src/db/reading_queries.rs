use anyhow::Result;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::domain::{NewReading, Reading, ReadingKey};

/// Insert a batch of readings. A reading whose `(meter_id, ts)` is already
/// stored is left untouched; corrections go through `apply_correction`.
///
/// Returns the keys of the rows actually written.
pub async fn insert_readings<'e, E>(executor: E, readings: &[NewReading]) -> Result<Vec<ReadingKey>>
where
    E: PgExecutor<'e>,
{
    if readings.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder =
        QueryBuilder::<Postgres>::new("INSERT INTO readings (meter_id, ts, value, source_system, import_key) ");
    builder.push_values(readings, |mut b, r| {
        b.push_bind(&r.meter_id)
            .push_bind(r.ts)
            .push_bind(r.value)
            .push_bind(&r.source_system)
            .push_bind(r.import_key());
    });
    builder.push(" ON CONFLICT (import_key) DO NOTHING RETURNING meter_id, ts");

    let written = builder.build_query_as::<ReadingKey>().fetch_all(executor).await?;
    Ok(written)
}

/// The last `limit` readings of a meter strictly before `before`, oldest first.
pub async fn history_window(
    pool: &PgPool,
    meter_id: &str,
    before: OffsetDateTime,
    limit: i64,
) -> Result<Vec<Reading>> {
    let mut rows = sqlx::query_as::<_, Reading>(
        r#"
        SELECT id, meter_id, ts, value, source_system, import_key
        FROM readings
        WHERE meter_id = $1
          AND ts < $2
        ORDER BY ts DESC
        LIMIT $3
        "#,
    )
    .bind(meter_id)
    .bind(before)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.reverse();
    Ok(rows)
}

/// Fetch a time-ordered load profile for a single meter.
pub async fn load_profile(
    pool: &PgPool,
    meter_id: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<Reading>> {
    let rows = sqlx::query_as::<_, Reading>(
        r#"
        SELECT id, meter_id, ts, value, source_system, import_key
        FROM readings
        WHERE meter_id = $1
          AND ts >= $2
          AND ts <  $3
        ORDER BY ts
        "#,
    )
    .bind(meter_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Most recent `limit` readings of a meter, oldest first.
pub async fn recent_readings(pool: &PgPool, meter_id: &str, limit: i64) -> Result<Vec<Reading>> {
    history_window(pool, meter_id, OffsetDateTime::now_utc(), limit).await
}
