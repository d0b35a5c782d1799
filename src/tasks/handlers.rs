//! What each task kind does when the worker runs it.

use std::time::Instant;

use serde_json::{json, Value};
use sqlx::PgPool;

use super::{ContentJob, EtlJob, PublishJob, TaskKind};
use crate::agent::{human_review_gate, ContentState, ContentWorkflow, Decision};
use crate::error::{AppError, AppResult};
use crate::etl;
use crate::models::Platform;
use crate::social::LinkedInClient;

/// How a task run ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    /// Waiting for human feedback; carries the pause info.
    Paused(Value),
}

/// Shared dependencies of the task handlers.
pub struct TaskContext {
    pub db: PgPool,
    pub linkedin: LinkedInClient,
    pub workflow: ContentWorkflow,
}

impl TaskContext {
    pub async fn run(&self, kind: TaskKind) -> AppResult<Outcome> {
        match kind {
            TaskKind::RunEtl(job) => run_etl(&self.db, &self.linkedin, &job).await,
            TaskKind::PublishPost(job) => publish_post(&self.linkedin, &job).await,
            TaskKind::GenerateContent(job) => generate_content(&self.workflow, job).await,
        }
    }
}

fn elapsed_secs(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

pub async fn run_etl(db: &PgPool, linkedin: &LinkedInClient, job: &EtlJob) -> AppResult<Outcome> {
    let started = Instant::now();
    tracing::info!(
        platform = %job.platform,
        account_id = %job.account_id,
        start_date = %job.start_date,
        end_date = %job.end_date,
        "Starting ETL"
    );

    let rows = etl::run_pipeline(
        db,
        linkedin,
        job.platform,
        &job.account_id,
        job.token(),
        job.start_date,
        job.end_date,
    )
    .await?;

    Ok(Outcome::Success(json!({
        "status": "Completed",
        "platform": job.platform,
        "account_id": job.account_id,
        "rows_processed": rows,
        "elapsed_time": elapsed_secs(started),
    })))
}

pub async fn publish_post(linkedin: &LinkedInClient, job: &PublishJob) -> AppResult<Outcome> {
    let started = Instant::now();
    tracing::info!(platform = %job.platform, account_id = %job.account_id, "Publishing post");

    let post_id = match job.platform {
        Platform::LinkedIn => {
            linkedin
                .publish(
                    &job.account_id,
                    job.token(),
                    &job.content,
                    job.link_url.as_deref(),
                )
                .await?
        }
        Platform::Instagram if job.image_url.is_none() => {
            return Err(AppError::Validation(
                "Missing image_url for Instagram post".to_string(),
            ));
        }
        other => return Err(AppError::UnsupportedPlatform(other.as_str().to_string())),
    };

    tracing::info!(post_id = %post_id, "Post published");
    Ok(Outcome::Success(json!({
        "status": "Completed",
        "platform": job.platform,
        "account_id": job.account_id,
        "post_id": post_id,
        "elapsed_time": elapsed_secs(started),
    })))
}

/// Pause info stored while a run waits for human feedback.
pub fn pause_info(state: &ContentState) -> AppResult<Value> {
    Ok(json!({
        "draft_content": state.final_post.clone().unwrap_or_default(),
        "checkpoint": serde_json::to_value(state)?,
    }))
}

fn finished(state: &ContentState) -> AppResult<Outcome> {
    Ok(Outcome::Success(serde_json::to_value(state.output())?))
}

pub async fn generate_content(workflow: &ContentWorkflow, job: ContentJob) -> AppResult<Outcome> {
    let state = match job {
        ContentJob::Request(request) => ContentState::new(request),
        ContentJob::Checkpoint(state) => {
            let state = *state;
            if human_review_gate(state.human_feedback.as_deref()) == Decision::End {
                tracing::info!("Draft approved by reviewer");
                return finished(&state);
            }
            state
        }
    };

    let state = workflow.run(state).await?;

    if state.request.human_review {
        tracing::info!(
            revision_cycles = state.revision_cycles,
            "Waiting for human review"
        );
        return Ok(Outcome::Paused(pause_info(&state)?));
    }
    finished(&state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ContentRequest;
    use crate::config::APP_CONFIG;
    use crate::llm::{Completion, LlmClient, ModelTier};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct ScriptedLlm {
        replies: Mutex<VecDeque<&'static str>>,
        calls: Mutex<usize>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().copied().collect()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, _tier: ModelTier, _prompt: &str) -> AppResult<Completion> {
            *self.calls.lock().unwrap() += 1;
            let text = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::Llm("script exhausted".to_string()))?;
            Ok(Completion::new(text, 1))
        }
    }

    const FULL_RUN: &[&str] = &["brief", "draft", "refined", "formatted", "post", "APPROVED"];

    fn request(human_review: bool) -> ContentRequest {
        ContentRequest {
            query: "Webinar announcement".to_string(),
            tone: "warm".to_string(),
            niche: "HR leaders".to_string(),
            account_name: "Acme".to_string(),
            link_url: None,
            human_review,
        }
    }

    fn publish_job(platform: Platform) -> PublishJob {
        PublishJob {
            platform,
            account_id: "123".to_string(),
            access_token: "token".to_string(),
            content: "Hi".to_string(),
            link_url: None,
            image_url: None,
            page_access_token: None,
        }
    }

    #[tokio::test]
    async fn test_generate_content_finishes_without_review() {
        let llm = ScriptedLlm::new(FULL_RUN);
        let workflow = ContentWorkflow::new(llm.clone(), 2);

        let outcome = generate_content(&workflow, ContentJob::Request(request(false)))
            .await
            .unwrap();

        let Outcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result["final_post"], "post");
        assert_eq!(result["total_tokens_used"], 6);
        assert_eq!(result["revision_cycles"], 1);
        assert_eq!(llm.calls(), 6);
    }

    #[tokio::test]
    async fn test_generate_content_pauses_for_review() {
        let workflow = ContentWorkflow::new(ScriptedLlm::new(FULL_RUN), 2);

        let outcome = generate_content(&workflow, ContentJob::Request(request(true)))
            .await
            .unwrap();

        let Outcome::Paused(info) = outcome else {
            panic!("expected pause");
        };
        assert_eq!(info["draft_content"], "post");
        let checkpoint: ContentState = serde_json::from_value(info["checkpoint"].clone()).unwrap();
        assert_eq!(checkpoint.final_post.as_deref(), Some("post"));
        assert!(checkpoint.request.human_review);
    }

    #[tokio::test]
    async fn test_resume_with_approval_skips_llm() {
        let llm = ScriptedLlm::new(&[]);
        let workflow = ContentWorkflow::new(llm.clone(), 2);

        let mut checkpoint = ContentState::new(request(true));
        checkpoint.final_post = Some("approved post".to_string());
        checkpoint.revision_cycles = 1;
        checkpoint.human_feedback = Some("Approve".to_string());

        let outcome = generate_content(&workflow, ContentJob::Checkpoint(Box::new(checkpoint)))
            .await
            .unwrap();

        let Outcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result["final_post"], "approved post");
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_resume_with_feedback_refines_and_pauses_again() {
        let llm = ScriptedLlm::new(&["refined v2", "formatted v2", "post v2", "APPROVED"]);
        let workflow = ContentWorkflow::new(llm.clone(), 2);

        let mut checkpoint = ContentState::new(request(true));
        checkpoint.creative_brief = Some("brief".to_string());
        checkpoint.draft_content = Some("draft".to_string());
        checkpoint.refined_content = Some("refined v1".to_string());
        checkpoint.final_post = Some("post v1".to_string());
        checkpoint.revision_cycles = 1;
        checkpoint.human_feedback = Some("Add a call to action".to_string());

        let outcome = generate_content(&workflow, ContentJob::Checkpoint(Box::new(checkpoint)))
            .await
            .unwrap();

        let Outcome::Paused(info) = outcome else {
            panic!("expected pause");
        };
        assert_eq!(info["draft_content"], "post v2");
        assert_eq!(llm.calls(), 4);
    }

    #[tokio::test]
    async fn test_publish_rejects_unsupported_platforms() {
        let linkedin = LinkedInClient::new(&APP_CONFIG);

        let err = publish_post(&linkedin, &publish_job(Platform::Facebook))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedPlatform(p) if p == "Facebook"));

        let err = publish_post(&linkedin, &publish_job(Platform::Instagram))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut with_image = publish_job(Platform::Instagram);
        with_image.image_url = Some("https://cdn.example.com/a.png".to_string());
        let err = publish_post(&linkedin, &with_image).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedPlatform(_)));
    }

    #[test]
    fn test_elapsed_secs_rounds_to_hundredths() {
        let secs = elapsed_secs(Instant::now());
        assert!(secs >= 0.0);
        assert!((secs * 100.0).fract().abs() < 1e-9);
    }
}
