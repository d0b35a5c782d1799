//! Content handlers: publishing and AI post generation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::agent::{ContentRequest, ContentState};
use crate::api::middlewares::AuthSession;
use crate::api::schemas::{
    parse_scheduled_time, GeneratePostRequest, GenerationStatusResponse, ResumeRequest,
    SchedulePostRequest, TaskResponse,
};
use crate::api::state::AppState;
use crate::error::{AppResult, ValidationErrorExt};
use crate::models::Platform;
use crate::tasks::{ContentJob, PublishJob, TaskKind};

/// Publish or schedule a post with the caller's platform token.
///
/// # Route
///
/// `POST /content/schedule_post`
pub async fn schedule_post_handler(
    State(state): State<AppState>,
    Extension(AuthSession(session)): Extension<AuthSession>,
    Json(req): Json<SchedulePostRequest>,
) -> AppResult<Json<TaskResponse>> {
    req.validate().map_err(|e| e.to_validation_error())?;

    let platform: Platform = req.platform.parse()?;
    if !platform.slug().eq_ignore_ascii_case(&session.provider) {
        tracing::warn!(
            platform = %platform,
            session_provider = %session.provider,
            "Publish platform differs from session provider"
        );
    }

    let requested = parse_scheduled_time(req.scheduled_time_str.as_deref())?;
    let now = Utc::now();
    let (eta, message) = match requested {
        Some(at) if at > now => (Some(at), format!("Post scheduled successfully for {}.", at.to_rfc3339())),
        Some(_) => (
            None,
            "Scheduled time is in the past, publishing task started now.".to_string(),
        ),
        None => (None, "Post publication task started now.".to_string()),
    };

    let job = PublishJob {
        platform,
        account_id: req.account_id,
        access_token: session.access_token,
        content: req.content,
        link_url: req.link_url.filter(|s| !s.is_empty()),
        image_url: None,
        page_access_token: None,
    };

    let enqueued = state.queue.enqueue_publish(job, eta).await?;
    tracing::info!(task_id = %enqueued.id(), eta = ?eta, "Publish request accepted");

    Ok(Json(TaskResponse::with_message(enqueued.id(), message)))
}

/// Start an AI post generation run.
///
/// # Route
///
/// `POST /content/generate_post`
pub async fn generate_post_handler(
    State(state): State<AppState>,
    Json(req): Json<GeneratePostRequest>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    req.validate().map_err(|e| e.to_validation_error())?;

    let request = ContentRequest::from(req);
    let human_review = request.human_review;
    let task_id = state
        .queue
        .enqueue(TaskKind::GenerateContent(ContentJob::Request(request)))
        .await?;

    tracing::info!(task_id = %task_id, human_review, "Content generation enqueued");
    Ok((StatusCode::ACCEPTED, Json(TaskResponse::new(task_id))))
}

/// # Route
///
/// `GET /content/generate_post/status/{task_id}`
pub async fn generation_status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<GenerationStatusResponse>> {
    let record = state.queue.status(task_id).await?;
    Ok(Json(GenerationStatusResponse::from(record)))
}

/// Feed human feedback into a paused generation run and re-queue it under
/// the same task id. A second resume of the same pause is rejected.
///
/// # Route
///
/// `POST /content/generate_post/resume`
pub async fn resume_generation_handler(
    State(state): State<AppState>,
    Json(req): Json<ResumeRequest>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    req.validate().map_err(|e| e.to_validation_error())?;

    let feedback = req.feedback;
    state
        .queue
        .resume_paused(req.task_id, |checkpoint| with_feedback(checkpoint, feedback))
        .await?;

    tracing::info!(task_id = %req.task_id, "Content generation resumed");
    Ok((
        StatusCode::ACCEPTED,
        Json(TaskResponse::with_message(
            req.task_id,
            "Content generation task resumed.",
        )),
    ))
}

fn with_feedback(mut checkpoint: ContentState, feedback: String) -> ContentState {
    checkpoint.human_feedback = Some(feedback.trim().to_string());
    checkpoint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{human_review_gate, Decision};

    fn checkpoint() -> ContentState {
        let mut state = ContentState::new(ContentRequest {
            query: "Launch".to_string(),
            tone: "bold".to_string(),
            niche: "devs".to_string(),
            account_name: "Acme".to_string(),
            link_url: None,
            human_review: true,
        });
        state.final_post = Some("Draft".to_string());
        state
    }

    #[test]
    fn test_with_feedback_sets_pending_feedback() {
        let resumed = with_feedback(checkpoint(), "  Make it shorter ".to_string());
        assert_eq!(resumed.pending_feedback(), Some("Make it shorter"));
        assert_eq!(resumed.final_post.as_deref(), Some("Draft"));
    }

    #[test]
    fn test_with_feedback_approval_ends_workflow() {
        let resumed = with_feedback(checkpoint(), "approve".to_string());
        assert_eq!(human_review_gate(resumed.pending_feedback()), Decision::End);
    }
}
