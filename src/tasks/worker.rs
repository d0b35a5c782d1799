//! Task consumer loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::handlers::{Outcome, TaskContext};
use super::queue::TaskQueue;
use super::Job;
use crate::error::AppError;

/// Delay before the next attempt, or `None` when the job should fail now.
///
/// Only transient errors are retried, and only while the job's budget lasts.
pub fn retry_delay(job: &Job, error: &AppError) -> Option<Duration> {
    let schedule = job.kind.retry_schedule();
    (error.is_retryable() && schedule.allows_retry(job.attempt)).then_some(schedule.delay)
}

pub struct Worker {
    queue: TaskQueue,
    context: Arc<TaskContext>,
    concurrency: usize,
    poll_secs: u64,
}

impl Worker {
    pub fn new(queue: TaskQueue, context: TaskContext, concurrency: usize, poll_secs: u64) -> Self {
        Self {
            queue,
            context: Arc::new(context),
            concurrency: concurrency.max(1),
            poll_secs: poll_secs.max(1),
        }
    }

    /// Consumes jobs until `shutdown` resolves, then waits for in-flight jobs.
    pub async fn run<S>(self, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = JoinSet::new();

        tracing::info!(concurrency = self.concurrency, "Worker started");

        loop {
            // Reap finished jobs so the set does not grow unbounded
            while in_flight.try_join_next().is_some() {}

            let permit = tokio::select! {
                () = &mut shutdown => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if let Err(e) = self.queue.promote_due(Utc::now()).await {
                tracing::error!(error = %e, "Failed to promote scheduled jobs");
            }

            // BRPOP is bounded by poll_secs and must not be cancelled once
            // Redis may have handed over a job
            match self.queue.pop(self.poll_secs).await {
                Ok(Some(job)) => {
                    let queue = self.queue.clone();
                    let context = Arc::clone(&self.context);
                    in_flight.spawn(async move {
                        process(&queue, &context, job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pop job");
                    tokio::time::sleep(Duration::from_secs(self.poll_secs)).await;
                }
            }

            if shutdown_requested(shutdown.as_mut()).await {
                break;
            }
        }

        tracing::info!(in_flight = in_flight.len(), "Worker stopping, draining jobs");
        while in_flight.join_next().await.is_some() {}
        tracing::info!("Worker stopped");
    }
}

/// Polls `shutdown` once without waiting on it.
async fn shutdown_requested<S>(shutdown: Pin<&mut S>) -> bool
where
    S: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = shutdown => true,
        () = std::future::ready(()) => false,
    }
}

async fn process(queue: &TaskQueue, context: &TaskContext, job: Job) {
    let id = job.id;
    let name = job.kind.name();
    let attempt = job.attempt;

    if let Err(e) = queue
        .update_record(id, name, |r| r.mark_started(attempt))
        .await
    {
        tracing::error!(task_id = %id, error = %e, "Failed to mark task started");
    }

    tracing::info!(task_id = %id, task = name, attempt, "Running task");
    let stored = match context.run(job.kind.clone()).await {
        Ok(Outcome::Success(value)) => {
            tracing::info!(task_id = %id, task = name, "Task succeeded");
            queue.update_record(id, name, |r| r.mark_success(value)).await
        }
        Ok(Outcome::Paused(info)) => {
            tracing::info!(task_id = %id, task = name, "Task waiting for user input");
            queue.update_record(id, name, |r| r.mark_paused(info)).await
        }
        Err(e) => match retry_delay(&job, &e) {
            Some(delay) => {
                tracing::warn!(task_id = %id, task = name, attempt, error = %e, "Task failed, retrying");
                let eta = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                match queue.retry_at(&job.next_attempt(), eta).await {
                    Ok(()) => queue.update_record(id, name, |r| r.mark_retry(e.to_string())).await,
                    Err(requeue_err) => {
                        tracing::error!(task_id = %id, error = %requeue_err, "Failed to requeue task");
                        queue.update_record(id, name, |r| r.mark_failure(e.to_string())).await
                    }
                }
            }
            None => {
                tracing::error!(task_id = %id, task = name, attempt, error = %e, "Task failed");
                queue.update_record(id, name, |r| r.mark_failure(e.to_string())).await
            }
        },
    };

    if let Err(e) = stored {
        tracing::error!(task_id = %id, error = %e, "Failed to store task result");
    }
}
