//! Daily account metrics.
//!
//! Long-format table: one row per (date, platform, account, metric).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppResult;

/// A single metric value for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRow {
    pub metric_date: NaiveDate,
    pub platform: String,
    pub account_id: String,
    pub metric_name: String,
    pub metric_value: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
struct MetricPoint {
    metric_date: NaiveDate,
    metric_name: String,
    metric_value: Option<i64>,
}

/// One date of a pivoted time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeseriesPoint {
    pub date: NaiveDate,
    pub values: BTreeMap<String, Option<i64>>,
}

/// Latest stored value of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct KpiValue {
    pub metric_name: String,
    pub metric_value: Option<i64>,
    pub metric_date: NaiveDate,
}

/// Keeps the last row for each primary key.
///
/// A single upsert statement may not touch the same key twice, so duplicates
/// coming out of a transform are collapsed first.
pub fn dedupe_rows(rows: &[MetricRow]) -> Vec<MetricRow> {
    let mut by_key: BTreeMap<(NaiveDate, &str, &str, &str), &MetricRow> = BTreeMap::new();
    for row in rows {
        by_key.insert(
            (
                row.metric_date,
                row.platform.as_str(),
                row.account_id.as_str(),
                row.metric_name.as_str(),
            ),
            row,
        );
    }
    by_key.into_values().cloned().collect()
}

fn pivot(points: Vec<MetricPoint>) -> Vec<TimeseriesPoint> {
    let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, Option<i64>>> = BTreeMap::new();
    for point in points {
        by_date
            .entry(point.metric_date)
            .or_default()
            .insert(point.metric_name, point.metric_value);
    }
    by_date
        .into_iter()
        .map(|(date, values)| TimeseriesPoint { date, values })
        .collect()
}

/// Metrics repository for database operations.
pub struct MetricsRepository;

impl MetricsRepository {
    /// Upserts metric rows, replacing the value and extraction time on conflict.
    ///
    /// Returns the number of rows written.
    pub async fn upsert_many(pool: &sqlx::PgPool, rows: &[MetricRow]) -> AppResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let rows = dedupe_rows(rows);
        let extracted_at: DateTime<Utc> = Utc::now();

        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.metric_date).collect();
        let platforms: Vec<String> = rows.iter().map(|r| r.platform.clone()).collect();
        let accounts: Vec<String> = rows.iter().map(|r| r.account_id.clone()).collect();
        let names: Vec<String> = rows.iter().map(|r| r.metric_name.clone()).collect();
        let values: Vec<Option<i64>> = rows.iter().map(|r| r.metric_value).collect();

        let result = sqlx::query(
            r"
            INSERT INTO daily_account_metrics (
                metric_date, platform, account_id, metric_name, metric_value, extracted_at
            )
            SELECT d, p, a, n, v, $6
            FROM UNNEST($1::date[], $2::text[], $3::text[], $4::text[], $5::int8[])
                AS t(d, p, a, n, v)
            ON CONFLICT (metric_date, platform, account_id, metric_name)
            DO UPDATE SET
                metric_value = EXCLUDED.metric_value,
                extracted_at = EXCLUDED.extracted_at
            ",
        )
        .bind(&dates)
        .bind(&platforms)
        .bind(&accounts)
        .bind(&names)
        .bind(&values)
        .bind(extracted_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Returns the requested metrics between two dates (inclusive), one entry per date.
    pub async fn timeseries(
        pool: &sqlx::PgPool,
        platform: &str,
        account_id: &str,
        metrics: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<TimeseriesPoint>> {
        if metrics.is_empty() {
            return Ok(Vec::new());
        }

        let points = sqlx::query_as::<_, MetricPoint>(
            r"
            SELECT metric_date, metric_name, metric_value
            FROM daily_account_metrics
            WHERE platform = $1
              AND account_id = $2
              AND metric_name = ANY($3)
              AND metric_date BETWEEN $4 AND $5
            ORDER BY metric_date, metric_name
            ",
        )
        .bind(platform)
        .bind(account_id)
        .bind(metrics)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

        Ok(pivot(points))
    }

    /// Returns the most recent value stored for each requested metric.
    pub async fn latest_kpis(
        pool: &sqlx::PgPool,
        platform: &str,
        account_id: &str,
        metrics: &[String],
    ) -> AppResult<Vec<KpiValue>> {
        if metrics.is_empty() {
            return Ok(Vec::new());
        }

        let kpis = sqlx::query_as::<_, KpiValue>(
            r"
            SELECT metric_name, metric_value, metric_date
            FROM (
                SELECT metric_name, metric_value, metric_date,
                       ROW_NUMBER() OVER (
                           PARTITION BY metric_name ORDER BY metric_date DESC
                       ) AS rn
                FROM daily_account_metrics
                WHERE platform = $1
                  AND account_id = $2
                  AND metric_name = ANY($3)
            ) ranked
            WHERE rn = 1
            ORDER BY metric_name
            ",
        )
        .bind(platform)
        .bind(account_id)
        .bind(metrics)
        .fetch_all(pool)
        .await?;

        Ok(kpis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(d: &str, name: &str, value: i64) -> MetricRow {
        MetricRow {
            metric_date: date(d),
            platform: "LinkedIn".to_string(),
            account_id: "urn:li:organization:1".to_string(),
            metric_name: name.to_string(),
            metric_value: Some(value),
        }
    }

    #[test]
    fn test_dedupe_keeps_last_value_per_key() {
        let rows = vec![
            row("2024-01-01", "follower_total", 10),
            row("2024-01-01", "page_views", 3),
            row("2024-01-01", "follower_total", 12),
        ];
        let deduped = dedupe_rows(&rows);

        assert_eq!(deduped.len(), 2);
        let followers = deduped
            .iter()
            .find(|r| r.metric_name == "follower_total")
            .unwrap();
        assert_eq!(followers.metric_value, Some(12));
    }

    #[test]
    fn test_dedupe_empty() {
        assert!(dedupe_rows(&[]).is_empty());
    }

    #[test]
    fn test_pivot_groups_by_date_in_order() {
        let points = vec![
            MetricPoint {
                metric_date: date("2024-01-02"),
                metric_name: "page_views".to_string(),
                metric_value: Some(7),
            },
            MetricPoint {
                metric_date: date("2024-01-01"),
                metric_name: "follower_total".to_string(),
                metric_value: Some(100),
            },
            MetricPoint {
                metric_date: date("2024-01-01"),
                metric_name: "page_views".to_string(),
                metric_value: None,
            },
        ];

        let series = pivot(points);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, date("2024-01-01"));
        assert_eq!(series[0].values.get("follower_total"), Some(&Some(100)));
        assert_eq!(series[0].values.get("page_views"), Some(&None));
        assert_eq!(series[1].values.len(), 1);
    }
}
