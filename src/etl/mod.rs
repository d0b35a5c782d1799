//! Analytics ETL: fetch platform statistics, reshape them into daily metric
//! rows and upsert them into `daily_account_metrics`.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{MetricRow, MetricsRepository, Platform};
use crate::social::{LinkedInClient, PageInsights};

pub const FOLLOWER_TOTAL: &str = "follower_total";
pub const PAGE_VIEWS: &str = "page_views";

/// Midnight UTC of `date` as epoch milliseconds.
pub fn date_to_epoch_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map_or(0, |dt| dt.and_utc().timestamp_millis())
}

fn epoch_ms_to_date(ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

fn elements(data: Option<&Value>) -> &[Value] {
    data.and_then(|d| d.get("elements"))
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn range_start_date(element: &Value) -> Option<NaiveDate> {
    element
        .get("timeRange")
        .and_then(|r| r.get("start"))
        .and_then(Value::as_i64)
        .filter(|ms| *ms != 0)
        .and_then(epoch_ms_to_date)
}

fn count(value: Option<&Value>, key: &str) -> i64 {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Turns LinkedIn organization statistics into metric rows.
///
/// Elements without a `timeRange.start` are skipped; missing counts are zero.
pub fn transform_linkedin(data: &PageInsights, org_urn: &str) -> Vec<MetricRow> {
    let row = |metric_date, metric_name: &str, value| MetricRow {
        metric_date,
        platform: Platform::LinkedIn.as_str().to_string(),
        account_id: org_urn.to_string(),
        metric_name: metric_name.to_string(),
        metric_value: Some(value),
    };

    let mut rows = Vec::new();

    for element in elements(data.followers.as_ref()) {
        let Some(date) = range_start_date(element) else {
            continue;
        };
        let counts = element.get("followerCounts");
        let total = count(counts, "organicFollowerCount") + count(counts, "paidFollowerCount");
        rows.push(row(date, FOLLOWER_TOTAL, total));
    }

    for element in elements(data.views.as_ref()) {
        let Some(date) = range_start_date(element) else {
            continue;
        };
        let views = count(element.get("totalPageViews"), "pageViews");
        rows.push(row(date, PAGE_VIEWS, views));
    }

    rows
}

/// Runs the pipeline for one account and date range, returning rows written.
pub async fn run_pipeline(
    pool: &PgPool,
    linkedin: &LinkedInClient,
    platform: Platform,
    account_id: &str,
    access_token: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<u64> {
    if end < start {
        return Err(AppError::Validation(
            "End date must be after start date".to_string(),
        ));
    }

    match platform.ensure_supported()? {
        Platform::LinkedIn => {
            let insights = linkedin
                .page_insights(
                    account_id,
                    access_token,
                    date_to_epoch_ms(start),
                    date_to_epoch_ms(end),
                )
                .await?;

            let rows = transform_linkedin(&insights, account_id);
            tracing::info!(
                account_id = %account_id,
                rows = rows.len(),
                "Transformed LinkedIn statistics"
            );
            MetricsRepository::upsert_many(pool, &rows).await
        }
        other => Err(AppError::UnsupportedPlatform(other.as_str().to_string())),
    }
}
