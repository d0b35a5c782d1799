//! Analytics handlers: ETL triggers, task status and metric queries.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::middlewares::AuthSession;
use crate::api::schemas::{
    split_metrics, KpisQuery, TaskResponse, TaskStatusResponse, TimeseriesQuery,
    TriggerEtlRequest,
};
use crate::api::state::AppState;
use crate::error::{AppError, AppResult, ValidationErrorExt};
use crate::models::{KpiValue, MetricsRepository, Platform, TimeseriesPoint};
use crate::social::Account;
use crate::tasks::{EtlJob, TaskKind};

/// Queue an ETL run for one account using the caller's token.
///
/// # Route
///
/// `POST /analytics/trigger_etl`
pub async fn trigger_etl_handler(
    State(state): State<AppState>,
    Extension(AuthSession(session)): Extension<AuthSession>,
    Json(req): Json<TriggerEtlRequest>,
) -> AppResult<Json<TaskResponse>> {
    req.validate().map_err(|e| e.to_validation_error())?;

    let platform: Platform = req.platform.parse()?;
    platform.ensure_supported()?;

    let job = EtlJob {
        platform,
        account_id: req.account_id,
        access_token: session.access_token,
        start_date: req.start_date,
        end_date: req.end_date,
        page_access_token: req.page_access_token.filter(|s| !s.is_empty()),
    };
    tracing::info!(
        platform = %job.platform,
        account_id = %job.account_id,
        start_date = %job.start_date,
        end_date = %job.end_date,
        "ETL requested"
    );

    let task_id = state.queue.enqueue(TaskKind::RunEtl(job)).await?;
    Ok(Json(TaskResponse::with_message(
        task_id,
        "ETL task started in background.",
    )))
}

/// # Route
///
/// `GET /analytics/tasks/status/{task_id}`
pub async fn task_status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskStatusResponse>> {
    let record = state.queue.status(task_id).await?;
    Ok(Json(TaskStatusResponse::from(record)))
}

fn requested_metrics(raw: &str) -> AppResult<Vec<String>> {
    let metrics = split_metrics(raw);
    if metrics.is_empty() {
        return Err(AppError::Validation(
            "At least one metric is required".to_string(),
        ));
    }
    Ok(metrics)
}

/// Daily values for the requested metrics.
///
/// # Route
///
/// `GET /analytics/timeseries`
pub async fn timeseries_handler(
    State(state): State<AppState>,
    Query(query): Query<TimeseriesQuery>,
) -> AppResult<Json<Vec<TimeseriesPoint>>> {
    query.validate().map_err(|e| e.to_validation_error())?;
    let platform: Platform = query.platform.parse()?;
    let metrics = requested_metrics(&query.metrics)?;

    let points = MetricsRepository::timeseries(
        &state.db,
        platform.as_str(),
        &query.account_id,
        &metrics,
        query.start_date,
        query.end_date,
    )
    .await?;
    Ok(Json(points))
}

/// Latest value of each requested metric.
///
/// # Route
///
/// `GET /analytics/kpis`
pub async fn kpis_handler(
    State(state): State<AppState>,
    Query(query): Query<KpisQuery>,
) -> AppResult<Json<Vec<KpiValue>>> {
    let platform: Platform = query.platform.parse()?;
    let metrics = requested_metrics(&query.metrics)?;

    let kpis =
        MetricsRepository::latest_kpis(&state.db, platform.as_str(), &query.account_id, &metrics)
            .await?;
    Ok(Json(kpis))
}

/// Organizations the caller administers on LinkedIn.
///
/// # Route
///
/// `GET /accounts/linkedin/organizations`
pub async fn organizations_handler(
    State(state): State<AppState>,
    Extension(AuthSession(session)): Extension<AuthSession>,
) -> AppResult<Json<Vec<Account>>> {
    let accounts = state.linkedin.organizations(&session.access_token).await?;
    tracing::info!(count = accounts.len(), "Listed LinkedIn organizations");
    Ok(Json(accounts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_metrics_rejects_empty() {
        assert!(matches!(
            requested_metrics(" , "),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_requested_metrics_splits() {
        assert_eq!(
            requested_metrics("follower_total,page_views").unwrap(),
            vec!["follower_total".to_string(), "page_views".to_string()]
        );
    }
}
