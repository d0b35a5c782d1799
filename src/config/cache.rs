//! Redis configuration module.
//!
//! Redis backs the task queue (ready list, scheduled set) and stores task records.

use crate::config::env::{get_env, APP_CONFIG};
use crate::error::{AppError, AppResult};
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use once_cell::sync::OnceCell;

static CACHE_POOL: OnceCell<Pool> = OnceCell::new();

/// Builds the Redis URL from `REDIS_URL` or the `REDIS_*` parts.
pub fn redis_url() -> String {
    let url = get_env("REDIS_URL", None);
    if !url.is_empty() {
        return url;
    }

    let host = get_env("REDIS_HOST", Some("localhost"));
    let port = get_env("REDIS_PORT", Some("6379"));
    let password = get_env("REDIS_PASSWORD", None);
    let db = get_env("REDIS_DB", Some("0"));

    if password.is_empty() {
        format!("redis://{host}:{port}/{db}")
    } else {
        format!("redis://:{password}@{host}:{port}/{db}")
    }
}

/// Initializes the Redis connection pool.
///
/// # Errors
///
/// Returns an error if the pool cannot be created or the first connection fails.
pub async fn init_cache() -> AppResult<Pool> {
    if let Some(pool) = CACHE_POOL.get() {
        return Ok(pool.clone());
    }

    let mut cfg = Config::from_url(redis_url());
    cfg.pool = Some(PoolConfig {
        max_size: APP_CONFIG.redis_max_connections,
        ..PoolConfig::default()
    });

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| AppError::Internal(format!("Redis pool error: {e}")))?;

    let conn = pool
        .get()
        .await
        .map_err(|e| AppError::Internal(format!("Redis connection test failed: {e}")))?;
    drop(conn);

    CACHE_POOL.set(pool.clone()).ok();
    tracing::info!(
        max_connections = APP_CONFIG.redis_max_connections,
        "Redis connection pool established"
    );

    Ok(pool)
}

/// Closes the Redis connection pool.
pub fn close_cache() {
    if let Some(pool) = CACHE_POOL.get() {
        pool.close();
    }
    tracing::info!("Redis connection pool closed");
}
