//! Background worker entry point.
//!
//! Runs ETL, publishing and content generation jobs from the Redis queue.

use std::sync::Arc;

use social_media_suite::agent::ContentWorkflow;
use social_media_suite::bootstrap::{
    connect_database, flush_sentry, init_sentry, init_tracing, shutdown_signal,
};
use social_media_suite::config::{close_cache, close_db, init_cache, APP_CONFIG};
use social_media_suite::llm::GeminiClient;
use social_media_suite::social::LinkedInClient;
use social_media_suite::tasks::{TaskContext, TaskQueue, Worker};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_tracing();
    let _guard = init_sentry();

    let db = connect_database().await;

    let cache = match init_cache().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to connect to Redis: {}", e);
            std::process::exit(1);
        }
    };

    if APP_CONFIG.genai_api_key.is_empty() {
        tracing::warn!("GENAI_API_KEY not set, content generation tasks will fail");
    }

    let workflow = ContentWorkflow::new(
        Arc::new(GeminiClient::new(&APP_CONFIG)),
        APP_CONFIG.max_revision_cycles,
    );
    let context = TaskContext {
        db,
        linkedin: LinkedInClient::new(&APP_CONFIG),
        workflow,
    };
    let queue = TaskQueue::new(cache, &APP_CONFIG);

    tracing::info!(
        concurrency = APP_CONFIG.worker_concurrency,
        queue_prefix = %APP_CONFIG.task_queue_prefix,
        "Starting worker"
    );

    Worker::new(
        queue,
        context,
        APP_CONFIG.worker_concurrency,
        APP_CONFIG.worker_poll_secs,
    )
    .run(shutdown_signal())
    .await;

    tracing::info!("Shutting down...");

    close_db().await;
    close_cache();
    flush_sentry();

    tracing::info!("Shutdown complete");
}
