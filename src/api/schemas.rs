//! Request/response schema module.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::agent::ContentRequest;
use crate::error::AppError;
use crate::models::TokenData;
use crate::tasks::{TaskRecord, TaskState};

// ============ Content ============

/// Post publishing request, immediate or scheduled.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SchedulePostRequest {
    #[validate(length(min = 1, message = "Platform is required"))]
    pub platform: String,

    #[validate(length(min = 1, message = "Account id is required"))]
    pub account_id: String,

    #[validate(length(
        min = 1,
        max = 3000,
        message = "Content must be between 1 and 3000 characters"
    ))]
    pub content: String,

    /// ISO 8601 publish time; absent or past means publish now
    #[serde(default)]
    pub scheduled_time_str: Option<String>,

    #[validate(url(message = "Invalid link URL"))]
    #[serde(default)]
    pub link_url: Option<String>,
}

/// AI post generation request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GeneratePostRequest {
    #[validate(length(min = 1, message = "Query is required"))]
    pub query: String,

    #[validate(length(min = 1, message = "Tone is required"))]
    pub tone: String,

    #[validate(length(min = 1, message = "Niche is required"))]
    pub niche: String,

    #[validate(length(min = 1, message = "Account name is required"))]
    pub account_name: String,

    #[validate(url(message = "Invalid link URL"))]
    #[serde(default)]
    pub link_url: Option<String>,

    /// Pause for approval after each draft
    #[serde(default)]
    pub human_review: bool,
}

impl From<GeneratePostRequest> for ContentRequest {
    fn from(req: GeneratePostRequest) -> Self {
        Self {
            query: req.query,
            tone: req.tone,
            niche: req.niche,
            account_name: req.account_name,
            link_url: req.link_url.filter(|s| !s.is_empty()),
            human_review: req.human_review,
        }
    }
}

/// Human feedback for a paused generation task.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResumeRequest {
    pub task_id: Uuid,

    /// Either an approval word or change requests
    #[validate(length(min = 1, message = "Feedback is required"))]
    pub feedback: String,
}

/// Response for any endpoint that enqueues a task.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskResponse {
    pub const fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            message: None,
        }
    }

    pub fn with_message(task_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            task_id,
            message: Some(message.into()),
        }
    }
}

/// Status of a content generation task.
#[derive(Debug, Serialize, PartialEq)]
pub struct GenerationStatusResponse {
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_content: Option<Value>,
}

impl From<TaskRecord> for GenerationStatusResponse {
    fn from(record: TaskRecord) -> Self {
        let mut response = Self {
            status: record.state,
            result: None,
            error: None,
            info: None,
            draft_content: None,
        };

        match record.state {
            TaskState::Pending => {}
            TaskState::Success => response.result = record.result,
            TaskState::Failure => response.error = record.error,
            TaskState::PendingUserInput => {
                response.draft_content = record
                    .result
                    .as_ref()
                    .and_then(|info| info.get("draft_content"))
                    .cloned();
                response.info = record.result;
            }
            TaskState::Started | TaskState::Retry => {
                response.info = Some(json!({
                    "attempts": record.attempts,
                    "error": record.error,
                }));
            }
        }
        response
    }
}

/// Parses an ISO 8601 publish time.
///
/// Offsets (`Z`, `+02:00`) are honored; a time without offset is taken as UTC.
/// Blank input means "publish now".
pub fn parse_scheduled_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid scheduled time format: {raw}. Use ISO 8601 format."
            ))
        })
}

// ============ Analytics ============

/// ETL trigger request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_etl_range"))]
pub struct TriggerEtlRequest {
    #[validate(length(min = 1, message = "Platform is required"))]
    pub platform: String,

    #[validate(length(min = 1, message = "Account id is required"))]
    pub account_id: String,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[serde(default)]
    pub page_access_token: Option<String>,
}

fn validate_etl_range(req: &TriggerEtlRequest) -> Result<(), ValidationError> {
    check_date_range(req.start_date, req.end_date)
}

fn check_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), ValidationError> {
    if end < start {
        let mut error = ValidationError::new("date_range");
        error.message = Some("End date must be after start date".into());
        return Err(error);
    }
    Ok(())
}

/// Status of any background task.
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskState,
    pub result: Option<Value>,
}

impl From<TaskRecord> for TaskStatusResponse {
    fn from(record: TaskRecord) -> Self {
        let result = match record.state {
            TaskState::Success => record.result,
            TaskState::Failure => Some(json!({ "error": record.error })),
            _ => None,
        };
        Self {
            task_id: record.id,
            status: record.state,
            result,
        }
    }
}

/// `GET /analytics/timeseries` query.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_timeseries_range"))]
pub struct TimeseriesQuery {
    pub platform: String,
    pub account_id: String,
    /// Comma separated metric names
    pub metrics: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

fn validate_timeseries_range(query: &TimeseriesQuery) -> Result<(), ValidationError> {
    check_date_range(query.start_date, query.end_date)
}

/// `GET /analytics/kpis` query.
#[derive(Debug, Clone, Deserialize)]
pub struct KpisQuery {
    pub platform: String,
    pub account_id: String,
    pub metrics: String,
}

/// Splits a comma separated metric list, dropping blanks and duplicates.
pub fn split_metrics(raw: &str) -> Vec<String> {
    let mut metrics: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !metrics.iter().any(|m| m == name) {
            metrics.push(name.to_string());
        }
    }
    metrics
}

// ============ Auth ============

/// OAuth callback query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `GET /auth/me` response.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_data: Option<TokenData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl MeResponse {
    pub const fn unauthenticated(reason: &'static str) -> Self {
        Self {
            authenticated: false,
            provider: None,
            user_info: None,
            token_data: None,
            reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    // ============ parse_scheduled_time ============

    #[test]
    fn test_parse_scheduled_time_blank_means_now() {
        assert_eq!(parse_scheduled_time(None).unwrap(), None);
        assert_eq!(parse_scheduled_time(Some("  ")).unwrap(), None);
    }

    #[test]
    fn test_parse_scheduled_time_zulu() {
        let parsed = parse_scheduled_time(Some("2030-05-01T09:30:00Z")).unwrap();
        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2030, 5, 1, 9, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_scheduled_time_with_offset() {
        let parsed = parse_scheduled_time(Some("2030-05-01T11:30:00+02:00")).unwrap();
        assert_eq!(
            parsed,
            Some(Utc.with_ymd_and_hms(2030, 5, 1, 9, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_scheduled_time_naive_is_utc() {
        let expected = Some(Utc.with_ymd_and_hms(2030, 5, 1, 9, 30, 0).unwrap());
        assert_eq!(parse_scheduled_time(Some("2030-05-01T09:30:00")).unwrap(), expected);
        assert_eq!(parse_scheduled_time(Some("2030-05-01T09:30")).unwrap(), expected);
        assert_eq!(parse_scheduled_time(Some("2030-05-01 09:30:00")).unwrap(), expected);
    }

    #[test]
    fn test_parse_scheduled_time_invalid() {
        let err = parse_scheduled_time(Some("next tuesday")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("ISO 8601")));
    }

    // ============ Validation ============

    #[test]
    fn test_schedule_post_requires_content() {
        let req: SchedulePostRequest = serde_json::from_value(json!({
            "platform": "linkedin",
            "account_id": "urn:li:organization:1",
            "content": ""
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_schedule_post_rejects_bad_link() {
        let req: SchedulePostRequest = serde_json::from_value(json!({
            "platform": "linkedin",
            "account_id": "urn:li:organization:1",
            "content": "Hello",
            "link_url": "not a url"
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_generate_post_into_content_request() {
        let req: GeneratePostRequest = serde_json::from_value(json!({
            "query": "Launch",
            "tone": "bold",
            "niche": "devs",
            "account_name": "Acme",
            "link_url": ""
        }))
        .unwrap();
        let content: ContentRequest = req.into();
        assert!(content.link_url.is_none());
        assert!(!content.human_review);
    }

    #[test]
    fn test_trigger_etl_rejects_reversed_range() {
        use crate::error::ValidationErrorExt;

        let req: TriggerEtlRequest = serde_json::from_value(json!({
            "platform": "linkedin",
            "account_id": "urn:li:organization:1",
            "start_date": "2024-02-01",
            "end_date": "2024-01-01"
        }))
        .unwrap();
        let err = req.validate().unwrap_err().to_validation_error();
        assert!(matches!(err, AppError::Validation(msg) if msg == "End date must be after start date"));
    }

    #[test]
    fn test_trigger_etl_same_day_is_valid() {
        let req: TriggerEtlRequest = serde_json::from_value(json!({
            "platform": "linkedin",
            "account_id": "urn",
            "start_date": "2024-01-01",
            "end_date": "2024-01-01"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.start_date, date("2024-01-01"));
    }

    #[test]
    fn test_split_metrics() {
        assert_eq!(
            split_metrics(" follower_total, page_views,,follower_total "),
            vec!["follower_total".to_string(), "page_views".to_string()]
        );
        assert!(split_metrics("").is_empty());
    }

    // ============ Status responses ============

    #[test]
    fn test_generation_status_pending_is_bare() {
        let response = GenerationStatusResponse::from(TaskRecord::unknown(Uuid::new_v4()));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status": "PENDING"})
        );
    }

    #[test]
    fn test_generation_status_paused_exposes_draft() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), "generate_content");
        record.mark_paused(json!({"draft_content": "Draft!", "checkpoint": {}}));

        let value = serde_json::to_value(GenerationStatusResponse::from(record)).unwrap();
        assert_eq!(value["status"], "PENDING_USER_INPUT");
        assert_eq!(value["draft_content"], "Draft!");
        assert_eq!(value["info"]["draft_content"], "Draft!");
    }

    #[test]
    fn test_generation_status_failure() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), "generate_content");
        record.mark_failure("LLM error: quota".to_string());

        let value = serde_json::to_value(GenerationStatusResponse::from(record)).unwrap();
        assert_eq!(value, json!({"status": "FAILURE", "error": "LLM error: quota"}));
    }

    #[test]
    fn test_task_status_failure_wraps_error() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), "run_etl");
        record.mark_failure("boom".to_string());

        let response = TaskStatusResponse::from(record);
        assert_eq!(response.result, Some(json!({"error": "boom"})));
    }

    #[test]
    fn test_task_status_running_has_no_result() {
        let mut record = TaskRecord::pending(Uuid::new_v4(), "run_etl");
        record.mark_started(1);

        let value = serde_json::to_value(TaskStatusResponse::from(record)).unwrap();
        assert_eq!(value["status"], "STARTED");
        assert!(value["result"].is_null());
    }

    #[test]
    fn test_me_response_unauthenticated_shape() {
        let value = serde_json::to_value(MeResponse::unauthenticated("Token expired")).unwrap();
        assert_eq!(value, json!({"authenticated": false, "reason": "Token expired"}));
    }
}
