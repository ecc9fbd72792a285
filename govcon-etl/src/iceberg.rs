//! Iceberg opportunity pass
//!
//! Sums prime and subcontract revenue across all months per UEI, scores
//! the split, and overwrites `iceberg_opportunities` through the same
//! batch upsert path as file imports.

use crate::error::LoadError;
use crate::fields::SqlValue;
use crate::loader::{finish_load, BatchSink, LoadOptions, LoadReport};
use crate::metrics::iceberg_score;
use crate::tables::ICEBERG_OPPORTUNITIES;
use crate::writer::RowValues;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Instant;
use tracing::info;

/// Rows per upsert for the iceberg table
pub const ICEBERG_BATCH_SIZE: usize = 500;

/// Recompute every UEI's iceberg record from `monthly_metrics`
pub async fn rebuild_iceberg(pool: &SqlitePool, options: &LoadOptions) -> LoadReport {
    let started_at = Utc::now();
    let timer = Instant::now();
    info!("Starting iceberg opportunity rebuild");

    let mut sink = BatchSink::new(pool, &ICEBERG_OPPORTUNITIES, options.batch_size);
    let before = sink.writer().row_count().await;

    let totals = sqlx::query_as::<_, (String, f64, f64)>(
        r#"
        SELECT uei, COALESCE(SUM(prime_revenue), 0.0), COALESCE(SUM(sub_revenue), 0.0)
        FROM monthly_metrics
        GROUP BY uei
        ORDER BY uei
        "#,
    )
    .fetch_all(pool)
    .await;

    let (progress, fatal, created) = match (before, totals) {
        (Ok(before), Ok(totals)) => {
            for (uei, prime, sub) in totals {
                sink.push(iceberg_row(uei, prime, sub)).await;
            }
            let progress = sink.finish().await;
            let after = sink_row_count(pool).await.unwrap_or(before);
            (progress, None, (after - before).max(0))
        }
        (Err(e), _) | (_, Err(e)) => (sink.abandon(), Some(LoadError::from(e)), 0),
    };

    finish_load(
        pool,
        ICEBERG_OPPORTUNITIES.table,
        options,
        started_at,
        timer,
        progress,
        created,
        fatal,
    )
    .await
}

async fn sink_row_count(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM iceberg_opportunities")
        .fetch_one(pool)
        .await
}

/// Row values in `ICEBERG_OPPORTUNITIES` column order
fn iceberg_row(uei: String, prime: f64, sub: f64) -> RowValues {
    let score = iceberg_score(prime, sub);
    vec![
        SqlValue::Text(uei),
        SqlValue::Real(score.prime_revenue),
        SqlValue::Real(score.sub_revenue),
        SqlValue::Real(score.total_revenue),
        score
            .sub_to_prime_ratio
            .map(SqlValue::Real)
            .unwrap_or(SqlValue::Null),
        SqlValue::Real(score.hidden_revenue_pct),
        SqlValue::Real(score.score),
        SqlValue::Text(score.tier.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_matches_table_columns() {
        let row = iceberg_row("U1".to_string(), 100.0, 200.0);
        assert_eq!(row.len(), ICEBERG_OPPORTUNITIES.columns.len());
        assert_eq!(row[4], SqlValue::Real(2.0));
        assert_eq!(row[7], SqlValue::Text("high".to_string()));
    }

    #[test]
    fn test_row_without_prime_revenue_has_null_ratio() {
        let row = iceberg_row("U2".to_string(), 0.0, 0.0);
        assert_eq!(row[4], SqlValue::Null);
        assert_eq!(row[6], SqlValue::Real(0.0));
    }
}
