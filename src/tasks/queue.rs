//! Redis-backed task queue.
//!
//! Layout under the configured prefix:
//! - `{prefix}:queue` list of ready jobs (LPUSH / BRPOP)
//! - `{prefix}:scheduled` sorted set of delayed jobs scored by ETA millis
//! - `{prefix}:task:{id}` task record with a TTL
//! - `{prefix}:dedupe:{hash}` publish deduplication marker
//! - `{prefix}:claim:{id}` short-lived lock held while a paused task resumes

use chrono::{DateTime, Utc};
use deadpool_redis::redis::{cmd, AsyncCommands};
use deadpool_redis::Pool;
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_128;

use super::{ContentJob, Job, PublishJob, TaskKind, TaskRecord, TaskState};
use crate::agent::ContentState;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Maximum scheduled jobs moved to the ready list per promotion pass.
const PROMOTE_BATCH: isize = 100;

/// Lifetime of a resume claim if its holder never releases it.
const CLAIM_SECS: u64 = 30;

/// Key names for one queue namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches(':').to_string(),
        }
    }

    pub fn ready(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    pub fn scheduled(&self) -> String {
        format!("{}:scheduled", self.prefix)
    }

    pub fn record(&self, id: Uuid) -> String {
        format!("{}:task:{id}", self.prefix)
    }

    pub fn dedupe(&self, hash: &str) -> String {
        format!("{}:dedupe:{hash}", self.prefix)
    }

    pub fn claim(&self, id: Uuid) -> String {
        format!("{}:claim:{id}", self.prefix)
    }
}

/// Hash identifying a publish request for deduplication.
pub fn publish_fingerprint(job: &PublishJob, eta: Option<DateTime<Utc>>) -> String {
    let eta = eta.map(|t| t.timestamp_millis()).unwrap_or_default();
    let input = format!(
        "{}:{}:{}:{}:{eta}",
        job.platform,
        job.account_id,
        job.content,
        job.link_url.as_deref().unwrap_or(""),
    );
    format!("{:032x}", xxh3_128(input.as_bytes()))
}

/// Whether a job scheduled for `eta` should go straight to the ready list.
pub fn is_due(eta: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    eta <= now
}

/// Result of an enqueue that may be deduplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Created(Uuid),
    Duplicate(Uuid),
}

impl Enqueued {
    pub const fn id(self) -> Uuid {
        match self {
            Self::Created(id) | Self::Duplicate(id) => id,
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    pool: Pool,
    keys: QueueKeys,
    result_ttl_secs: u64,
    dedupe_secs: u64,
}

impl TaskQueue {
    pub fn new(pool: Pool, config: &AppConfig) -> Self {
        Self {
            pool,
            keys: QueueKeys::new(&config.task_queue_prefix),
            result_ttl_secs: config.task_result_ttl_secs,
            dedupe_secs: config.publish_dedupe_secs,
        }
    }

    // ============ Producer ============

    /// Queues a job for immediate execution and returns its task id.
    pub async fn enqueue(&self, kind: TaskKind) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.store_record(&TaskRecord::pending(id, kind.name()))
            .await?;
        self.push_ready(&Job::new(id, kind)).await?;

        tracing::info!(task_id = %id, "Task enqueued");
        Ok(id)
    }

    /// Queues a job to run at `eta`; past ETAs run immediately.
    pub async fn enqueue_at(&self, kind: TaskKind, eta: DateTime<Utc>) -> AppResult<Uuid> {
        if is_due(eta, Utc::now()) {
            return self.enqueue(kind).await;
        }

        let id = Uuid::new_v4();
        self.store_record(&TaskRecord::pending(id, kind.name()))
            .await?;
        self.schedule(&Job::new(id, kind), eta).await?;

        tracing::info!(task_id = %id, eta = %eta, "Task scheduled");
        Ok(id)
    }

    /// Re-queues work under an existing task id, keeping its record history.
    pub async fn enqueue_with_id(&self, id: Uuid, kind: TaskKind) -> AppResult<()> {
        let mut record = self
            .load_record(id)
            .await?
            .unwrap_or_else(|| TaskRecord::pending(id, kind.name()));
        record.mark_pending();
        self.store_record(&record).await?;
        self.push_ready(&Job::new(id, kind)).await?;

        tracing::info!(task_id = %id, "Task re-enqueued");
        Ok(())
    }

    /// Queues a publish job unless an identical one was queued within the
    /// deduplication window.
    pub async fn enqueue_publish(
        &self,
        job: PublishJob,
        eta: Option<DateTime<Utc>>,
    ) -> AppResult<Enqueued> {
        let dedupe_key = self.keys.dedupe(&publish_fingerprint(&job, eta));
        let id = Uuid::new_v4();

        let mut conn = self.pool.get().await?;
        let acquired: Option<String> = cmd("SET")
            .arg(&dedupe_key)
            .arg(id.to_string())
            .arg("NX")
            .arg("EX")
            .arg(self.dedupe_secs.max(1))
            .query_async(&mut conn)
            .await?;

        if acquired.is_none() {
            let existing: Option<String> = conn.get(&dedupe_key).await?;
            if let Some(existing) = existing.and_then(|s| Uuid::parse_str(&s).ok()) {
                tracing::info!(task_id = %existing, "Duplicate publish request ignored");
                return Ok(Enqueued::Duplicate(existing));
            }
        }
        drop(conn);

        // A marker without a queued job would swallow every retry of the
        // request until it expires
        if let Err(e) = self.queue_new(id, TaskKind::PublishPost(job), eta).await {
            if let Err(release_err) = self.delete_key(&dedupe_key).await {
                tracing::error!(task_id = %id, error = %release_err, "Failed to release dedupe marker");
            }
            return Err(e);
        }

        tracing::info!(task_id = %id, eta = ?eta, "Publish task enqueued");
        Ok(Enqueued::Created(id))
    }

    /// Re-queues a task paused for user input with `resume` applied to its
    /// checkpoint.
    ///
    /// Concurrent calls for the same id are serialized by a claim key, so only
    /// one of them sees the task still paused.
    pub async fn resume_paused<F>(&self, id: Uuid, resume: F) -> AppResult<()>
    where
        F: FnOnce(ContentState) -> ContentState,
    {
        let claim_key = self.keys.claim(id);
        let mut conn = self.pool.get().await?;
        let claimed: Option<String> = cmd("SET")
            .arg(&claim_key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(CLAIM_SECS)
            .query_async(&mut conn)
            .await?;
        drop(conn);

        if claimed.is_none() {
            tracing::warn!(task_id = %id, "Resume already in progress");
            return Err(not_paused());
        }

        let resumed = self.requeue_checkpoint(id, resume).await;
        if let Err(e) = self.delete_key(&claim_key).await {
            tracing::error!(task_id = %id, error = %e, "Failed to release resume claim");
        }
        resumed
    }

    async fn requeue_checkpoint<F>(&self, id: Uuid, resume: F) -> AppResult<()>
    where
        F: FnOnce(ContentState) -> ContentState,
    {
        let record = self
            .load_record(id)
            .await?
            .filter(|record| record.state == TaskState::PendingUserInput)
            .ok_or_else(not_paused)?;

        let checkpoint = record
            .checkpoint()
            .ok_or_else(|| AppError::NotFound("Checkpoint not found for the task.".to_string()))?;

        let kind = TaskKind::GenerateContent(ContentJob::Checkpoint(Box::new(resume(checkpoint))));
        self.enqueue_with_id(id, kind).await
    }

    async fn queue_new(&self, id: Uuid, kind: TaskKind, eta: Option<DateTime<Utc>>) -> AppResult<()> {
        self.store_record(&TaskRecord::pending(id, kind.name()))
            .await?;
        let job = Job::new(id, kind);
        match eta.filter(|eta| !is_due(*eta, Utc::now())) {
            Some(eta) => self.schedule(&job, eta).await,
            None => self.push_ready(&job).await,
        }
    }

    // ============ Records ============

    /// Current record of a task; unknown ids read as `PENDING`.
    pub async fn status(&self, id: Uuid) -> AppResult<TaskRecord> {
        Ok(self
            .load_record(id)
            .await?
            .unwrap_or_else(|| TaskRecord::unknown(id)))
    }

    pub async fn load_record(&self, id: Uuid) -> AppResult<Option<TaskRecord>> {
        let mut conn = self.pool.get().await?;
        let bytes: Option<Vec<u8>> = conn.get(self.keys.record(id)).await?;
        bytes
            .map(|b| rmp_serde::from_slice(&b))
            .transpose()
            .map_err(AppError::from)
    }

    pub async fn store_record(&self, record: &TaskRecord) -> AppResult<()> {
        let data = rmp_serde::to_vec_named(record)?;
        let mut conn = self.pool.get().await?;
        let () = conn
            .set_ex(self.keys.record(record.id), data, self.result_ttl_secs)
            .await?;
        Ok(())
    }

    /// Loads a record, applies `update` and stores it again.
    pub async fn update_record<F>(&self, id: Uuid, name: &str, update: F) -> AppResult<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut record = self
            .load_record(id)
            .await?
            .unwrap_or_else(|| TaskRecord::pending(id, name));
        update(&mut record);
        self.store_record(&record).await?;
        Ok(record)
    }

    // ============ Consumer ============

    /// Moves scheduled jobs whose ETA has passed onto the ready list.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut conn = self.pool.get().await?;
        let due: Vec<Vec<u8>> = conn
            .zrangebyscore_limit(
                self.keys.scheduled(),
                "-inf",
                now.timestamp_millis(),
                0,
                PROMOTE_BATCH,
            )
            .await?;

        let mut promoted = 0;
        for member in due {
            // Only the worker that removes the member pushes it
            let removed: i64 = conn.zrem(self.keys.scheduled(), &member).await?;
            if removed == 1 {
                let () = conn.lpush(self.keys.ready(), &member).await?;
                promoted += 1;
            }
        }

        if promoted > 0 {
            tracing::debug!(promoted, "Promoted scheduled jobs");
        }
        Ok(promoted)
    }

    /// Blocks up to `timeout_secs` for the next ready job.
    pub async fn pop(&self, timeout_secs: u64) -> AppResult<Option<Job>> {
        let mut conn = self.pool.get().await?;
        #[allow(clippy::cast_precision_loss)]
        let popped: Option<(String, Vec<u8>)> =
            conn.brpop(self.keys.ready(), timeout_secs as f64).await?;

        popped
            .map(|(_, bytes)| rmp_serde::from_slice(&bytes))
            .transpose()
            .map_err(AppError::from)
    }

    /// Puts a job back on the scheduled set to run again at `eta`.
    pub async fn retry_at(&self, job: &Job, eta: DateTime<Utc>) -> AppResult<()> {
        self.schedule(job, eta).await
    }

    async fn delete_key(&self, key: &str) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn push_ready(&self, job: &Job) -> AppResult<()> {
        let data = rmp_serde::to_vec_named(job)?;
        let mut conn = self.pool.get().await?;
        let () = conn.lpush(self.keys.ready(), data).await?;
        Ok(())
    }

    async fn schedule(&self, job: &Job, eta: DateTime<Utc>) -> AppResult<()> {
        let data = rmp_serde::to_vec_named(job)?;
        let mut conn = self.pool.get().await?;
        let () = conn
            .zadd(self.keys.scheduled(), data, eta.timestamp_millis())
            .await?;
        Ok(())
    }
}

fn not_paused() -> AppError {
    AppError::BadRequest("Task is not pending user input.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use chrono::Duration;

    fn job() -> PublishJob {
        PublishJob {
            platform: Platform::LinkedIn,
            account_id: "urn:li:organization:42".to_string(),
            access_token: "token".to_string(),
            content: "Launch day!".to_string(),
            link_url: None,
            image_url: None,
            page_access_token: None,
        }
    }

    #[test]
    fn test_queue_keys() {
        let keys = QueueKeys::new("sms:");
        assert_eq!(keys.ready(), "sms:queue");
        assert_eq!(keys.scheduled(), "sms:scheduled");
        assert_eq!(keys.dedupe("abc"), "sms:dedupe:abc");

        let id = Uuid::nil();
        assert_eq!(
            keys.record(id),
            "sms:task:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            keys.claim(id),
            "sms:claim:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_publish_fingerprint_is_stable() {
        let eta = Some(Utc::now());
        let a = publish_fingerprint(&job(), eta);
        let b = publish_fingerprint(&job(), eta);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_publish_fingerprint_ignores_token() {
        let mut other = job();
        other.access_token = "refreshed".to_string();
        assert_eq!(publish_fingerprint(&job(), None), publish_fingerprint(&other, None));
    }

    #[test]
    fn test_publish_fingerprint_differs_by_content_and_eta() {
        let now = Utc::now();
        let mut other = job();
        other.content = "Launch day!!".to_string();

        assert_ne!(publish_fingerprint(&job(), None), publish_fingerprint(&other, None));
        assert_ne!(
            publish_fingerprint(&job(), Some(now)),
            publish_fingerprint(&job(), Some(now + Duration::minutes(5)))
        );
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        assert!(is_due(now - Duration::seconds(1), now));
        assert!(is_due(now, now));
        assert!(!is_due(now + Duration::seconds(1), now));
    }

    #[test]
    fn test_enqueued_id() {
        let id = Uuid::new_v4();
        assert_eq!(Enqueued::Created(id).id(), id);
        assert_eq!(Enqueued::Duplicate(id).id(), id);
    }
}
