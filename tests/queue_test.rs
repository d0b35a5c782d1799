//! Task queue and worker tests against a live Redis.
//!
//! Each test is skipped unless `REDIS_URL` is set. Every test works under its
//! own key prefix so runs never see each other's jobs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use social_media_suite::agent::{ContentRequest, ContentState, ContentWorkflow};
use social_media_suite::config::{redis_url, AppConfig, APP_CONFIG};
use social_media_suite::error::AppError;
use social_media_suite::llm::GeminiClient;
use social_media_suite::models::Platform;
use social_media_suite::social::{LinkedInClient, RetryPolicy};
use social_media_suite::tasks::{
    ContentJob, Enqueued, Job, PublishJob, TaskContext, TaskKind, TaskQueue, TaskRecord,
    TaskState, Worker,
};

/// Config with a prefix private to one test, or `None` without Redis.
fn test_config() -> Option<AppConfig> {
    if std::env::var("REDIS_URL").is_err() {
        eprintln!("REDIS_URL not set, skipping");
        return None;
    }
    let mut config = APP_CONFIG.clone();
    config.task_queue_prefix = format!("sms-test:{}", Uuid::new_v4());
    config.task_result_ttl_secs = 300;
    config.publish_dedupe_secs = 60;
    Some(config)
}

fn queue(config: &AppConfig) -> TaskQueue {
    let pool = deadpool_redis::Config::from_url(redis_url())
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .unwrap();
    TaskQueue::new(pool, config)
}

fn publish_job(platform: Platform, content: &str) -> PublishJob {
    PublishJob {
        platform,
        account_id: "urn:li:organization:42".to_string(),
        access_token: "token".to_string(),
        content: content.to_string(),
        link_url: None,
        image_url: None,
        page_access_token: None,
    }
}

/// Resolves on its second poll.
struct ShutdownAfterFirstPoll {
    polled: bool,
}

impl Future for ShutdownAfterFirstPoll {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.polled {
            return Poll::Ready(());
        }
        self.polled = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

fn worker(queue: TaskQueue, config: &AppConfig) -> Worker {
    let context = TaskContext {
        db: sqlx::PgPool::connect_lazy("postgres://postgres@127.0.0.1:5432/unused").unwrap(),
        linkedin: LinkedInClient::new(config)
            .with_retry_policy(RetryPolicy::new(1, std::time::Duration::ZERO)),
        workflow: ContentWorkflow::new(Arc::new(GeminiClient::new(config)), 1),
    };
    Worker::new(queue, context, 2, 1)
}

// ============ Records ============

#[tokio::test]
async fn test_unknown_task_reads_pending() {
    let Some(config) = test_config() else { return };
    let record = queue(&config).status(Uuid::new_v4()).await.unwrap();
    assert_eq!(record.state, TaskState::Pending);
}

#[tokio::test]
async fn test_enqueue_with_id_keeps_task_id() {
    let Some(config) = test_config() else { return };
    let queue = queue(&config);
    let id = Uuid::new_v4();

    let mut record = TaskRecord::pending(id, "generate_content");
    record.mark_failure("boom".to_string());
    queue.store_record(&record).await.unwrap();

    let kind = TaskKind::PublishPost(publish_job(Platform::LinkedIn, "again"));
    queue.enqueue_with_id(id, kind).await.unwrap();

    let record = queue.status(id).await.unwrap();
    assert_eq!(record.state, TaskState::Pending);
    assert_eq!(record.id, id);

    let job = queue.pop(1).await.unwrap().expect("job queued");
    assert_eq!(job.id, id);
    assert_eq!(job.attempt, 1);
}

// ============ Publish deduplication ============

#[tokio::test]
async fn test_identical_publish_returns_original_id() {
    let Some(config) = test_config() else { return };
    let queue = queue(&config);

    let first = queue
        .enqueue_publish(publish_job(Platform::LinkedIn, "Launch"), None)
        .await
        .unwrap();
    let second = queue
        .enqueue_publish(publish_job(Platform::LinkedIn, "Launch"), None)
        .await
        .unwrap();
    let other = queue
        .enqueue_publish(publish_job(Platform::LinkedIn, "Launch!"), None)
        .await
        .unwrap();

    assert!(matches!(first, Enqueued::Created(_)));
    assert_eq!(second, Enqueued::Duplicate(first.id()));
    assert!(matches!(other, Enqueued::Created(id) if id != first.id()));
}

#[tokio::test]
async fn test_failed_publish_enqueue_allows_retry() {
    let Some(config) = test_config() else { return };

    // An expiry of zero makes the record write fail after the marker is set
    let mut broken = config.clone();
    broken.task_result_ttl_secs = 0;
    let result = queue(&broken)
        .enqueue_publish(publish_job(Platform::LinkedIn, "Launch"), None)
        .await;
    assert!(result.is_err());

    let retried = queue(&config)
        .enqueue_publish(publish_job(Platform::LinkedIn, "Launch"), None)
        .await
        .unwrap();
    assert!(matches!(retried, Enqueued::Created(_)));
}

// ============ Scheduling ============

#[tokio::test]
async fn test_promote_due_moves_only_due_jobs() {
    let Some(config) = test_config() else { return };
    let queue = queue(&config);
    let now = Utc::now();

    let due = Job::new(Uuid::new_v4(), TaskKind::PublishPost(publish_job(Platform::LinkedIn, "a")));
    let later = Job::new(Uuid::new_v4(), TaskKind::PublishPost(publish_job(Platform::LinkedIn, "b")));
    queue.retry_at(&due, now - Duration::seconds(1)).await.unwrap();
    queue.retry_at(&later, now + Duration::hours(1)).await.unwrap();

    assert_eq!(queue.promote_due(now).await.unwrap(), 1);
    assert_eq!(queue.pop(1).await.unwrap().map(|job| job.id), Some(due.id));
    assert_eq!(queue.promote_due(now).await.unwrap(), 0);

    assert_eq!(queue.promote_due(now + Duration::hours(2)).await.unwrap(), 1);
    assert_eq!(queue.pop(1).await.unwrap().map(|job| job.id), Some(later.id));
}

#[tokio::test]
async fn test_future_eta_waits_in_scheduled_set() {
    let Some(config) = test_config() else { return };
    let queue = queue(&config);
    let now = Utc::now();

    let kind = TaskKind::PublishPost(publish_job(Platform::LinkedIn, "later"));
    let id = queue.enqueue_at(kind, now + Duration::minutes(10)).await.unwrap();

    assert_eq!(queue.status(id).await.unwrap().state, TaskState::Pending);
    assert_eq!(queue.promote_due(now).await.unwrap(), 0);
    assert_eq!(queue.promote_due(now + Duration::minutes(11)).await.unwrap(), 1);
}

// ============ Resume ============

fn paused_record(id: Uuid) -> TaskRecord {
    let mut checkpoint = ContentState::new(ContentRequest {
        query: "Launch".to_string(),
        tone: "bold".to_string(),
        niche: "devs".to_string(),
        account_name: "Acme".to_string(),
        link_url: None,
        human_review: true,
    });
    checkpoint.final_post = Some("Draft".to_string());

    let mut record = TaskRecord::pending(id, "generate_content");
    record.mark_paused(json!({
        "draft_content": "Draft",
        "checkpoint": serde_json::to_value(&checkpoint).unwrap(),
    }));
    record
}

#[tokio::test]
async fn test_concurrent_resumes_queue_one_job() {
    let Some(config) = test_config() else { return };
    let queue = queue(&config);
    let id = Uuid::new_v4();
    queue.store_record(&paused_record(id)).await.unwrap();

    let feedback = |mut state: ContentState| {
        state.human_feedback = Some("shorter".to_string());
        state
    };
    let (a, b) = tokio::join!(
        queue.resume_paused(id, feedback),
        queue.resume_paused(id, feedback)
    );

    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    let rejected = a.err().or(b.err()).unwrap();
    assert!(matches!(rejected, AppError::BadRequest(_)));

    let job = queue.pop(1).await.unwrap().expect("one job queued");
    assert_eq!(job.id, id);
    let TaskKind::GenerateContent(ContentJob::Checkpoint(state)) = job.kind else {
        panic!("expected checkpoint job");
    };
    assert_eq!(state.human_feedback.as_deref(), Some("shorter"));
    assert!(queue.pop(1).await.unwrap().is_none());
    assert_eq!(queue.status(id).await.unwrap().state, TaskState::Pending);
}

#[tokio::test]
async fn test_resume_requires_paused_task() {
    let Some(config) = test_config() else { return };
    let queue = queue(&config);

    let err = queue
        .resume_paused(Uuid::new_v4(), |state| state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Paused without a checkpoint
    let id = Uuid::new_v4();
    let mut record = TaskRecord::pending(id, "generate_content");
    record.mark_paused(json!({"draft_content": "Draft"}));
    queue.store_record(&record).await.unwrap();
    let err = queue.resume_paused(id, |state| state).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============ Worker ============

#[tokio::test]
async fn test_job_popped_before_shutdown_still_runs() {
    let Some(config) = test_config() else { return };
    let queue = queue(&config);

    // Unsupported platform fails at once without any network call
    let id = queue
        .enqueue(TaskKind::PublishPost(publish_job(Platform::Facebook, "hi")))
        .await
        .unwrap();

    worker(queue.clone(), &config)
        .run(ShutdownAfterFirstPoll { polled: false })
        .await;

    let record = queue.status(id).await.unwrap();
    assert_eq!(record.state, TaskState::Failure);
    assert_eq!(record.attempts, 1);
    assert!(queue.pop(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transient_failure_is_rescheduled_with_kind_delay() {
    let Some(mut config) = test_config() else { return };
    config.li_api_url = "http://127.0.0.1:1".to_string();
    let queue = queue(&config);

    let id = queue
        .enqueue(TaskKind::PublishPost(publish_job(Platform::LinkedIn, "hi")))
        .await
        .unwrap();
    let started = Utc::now();

    worker(queue.clone(), &config)
        .run(ShutdownAfterFirstPoll { polled: false })
        .await;

    let record = queue.status(id).await.unwrap();
    assert_eq!(record.state, TaskState::Retry);
    assert!(record.error.is_some());

    // Publish retries wait 30 seconds
    assert_eq!(queue.promote_due(started + Duration::seconds(20)).await.unwrap(), 0);
    assert_eq!(queue.promote_due(Utc::now() + Duration::seconds(31)).await.unwrap(), 1);

    let job = queue.pop(1).await.unwrap().expect("retry queued");
    assert_eq!(job.id, id);
    assert_eq!(job.attempt, 2);
}
