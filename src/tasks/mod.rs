//! Background task layer.
//!
//! The API enqueues jobs into Redis, the `worker` binary pops and runs them and
//! writes a [`TaskRecord`] that status endpoints read back.

pub mod handlers;
pub mod queue;
pub mod worker;

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::{ContentRequest, ContentState};
use crate::models::Platform;

pub use handlers::{Outcome, TaskContext};
pub use queue::{Enqueued, QueueKeys, TaskQueue};
pub use worker::Worker;

/// Lifecycle state of a task, serialized the way status endpoints report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    PendingUserInput,
}

impl TaskState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Retry => "RETRY",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::PendingUserInput => "PENDING_USER_INPUT",
        }
    }
}

/// Fetch-and-store analytics for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtlJob {
    pub platform: Platform,
    pub account_id: String,
    pub access_token: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub page_access_token: Option<String>,
}

impl EtlJob {
    pub fn token(&self) -> &str {
        page_or_user_token(self.platform, &self.access_token, self.page_access_token.as_deref())
    }
}

fn page_or_user_token<'a>(platform: Platform, user: &'a str, page: Option<&'a str>) -> &'a str {
    match platform {
        Platform::LinkedIn => user,
        Platform::Facebook | Platform::Instagram => page.unwrap_or(user),
    }
}

/// Publish a post, now or at a scheduled time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishJob {
    pub platform: Platform,
    pub account_id: String,
    pub access_token: String,
    pub content: String,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub page_access_token: Option<String>,
}

impl PublishJob {
    /// Token used against the platform: page tokens win where they apply.
    pub fn token(&self) -> &str {
        page_or_user_token(self.platform, &self.access_token, self.page_access_token.as_deref())
    }
}

/// Content generation either starts from a request or resumes a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentJob {
    Request(ContentRequest),
    Checkpoint(Box<ContentState>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    RunEtl(EtlJob),
    PublishPost(PublishJob),
    GenerateContent(ContentJob),
}

impl TaskKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunEtl(_) => "run_etl",
            Self::PublishPost(_) => "publish_post",
            Self::GenerateContent(_) => "generate_content",
        }
    }

    pub const fn retry_schedule(&self) -> RetrySchedule {
        match self {
            Self::RunEtl(_) => RetrySchedule::new(3, Duration::from_secs(5)),
            Self::PublishPost(_) => RetrySchedule::new(2, Duration::from_secs(30)),
            Self::GenerateContent(_) => RetrySchedule::new(0, Duration::ZERO),
        }
    }
}

/// How often a failed job is re-queued and after how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetrySchedule {
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// `attempt` counts from 1 for the first run.
    pub const fn allows_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

/// Unit of work travelling through the Redis lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: TaskKind,
    pub attempt: u32,
}

impl Job {
    pub const fn new(id: Uuid, kind: TaskKind) -> Self {
        Self {
            id,
            kind,
            attempt: 1,
        }
    }

    #[must_use]
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// Stored state of a task, read by the status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub name: String,
    pub state: TaskState,
    /// Success payload, or pause info for `PENDING_USER_INPUT`.
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn pending(id: Uuid, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.to_string(),
            state: TaskState::Pending,
            result: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Placeholder for ids nothing is known about; unknown tasks read as pending.
    pub fn unknown(id: Uuid) -> Self {
        Self::pending(id, "unknown")
    }

    fn transition(&mut self, state: TaskState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn mark_pending(&mut self) {
        self.transition(TaskState::Pending);
        self.error = None;
    }

    pub fn mark_started(&mut self, attempt: u32) {
        self.transition(TaskState::Started);
        self.attempts = attempt;
    }

    pub fn mark_retry(&mut self, error: String) {
        self.transition(TaskState::Retry);
        self.error = Some(error);
    }

    pub fn mark_success(&mut self, result: Value) {
        self.transition(TaskState::Success);
        self.result = Some(result);
        self.error = None;
    }

    pub fn mark_failure(&mut self, error: String) {
        self.transition(TaskState::Failure);
        self.result = None;
        self.error = Some(error);
    }

    pub fn mark_paused(&mut self, info: Value) {
        self.transition(TaskState::PendingUserInput);
        self.result = Some(info);
        self.error = None;
    }

    /// Checkpoint stored with a paused content task.
    pub fn checkpoint(&self) -> Option<ContentState> {
        if self.state != TaskState::PendingUserInput {
            return None;
        }
        self.result
            .as_ref()
            .and_then(|info| info.get("checkpoint"))
            .and_then(|c| serde_json::from_value(c.clone()).ok())
    }
}
