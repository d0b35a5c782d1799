//! Application state module.
//!
//! Contains shared state for the database, Redis, the task queue and the
//! LinkedIn client.

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use deadpool_redis::Pool as RedisPool;
use sqlx::PgPool;

use crate::social::LinkedInClient;
use crate::tasks::TaskQueue;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// `PostgreSQL` connection pool
    pub db: PgPool,
    /// Redis connection pool
    pub cache: RedisPool,
    /// Producer side of the task queue
    pub queue: TaskQueue,
    pub linkedin: LinkedInClient,
    /// Signs the OAuth state cookie
    pub cookie_key: Key,
}

impl AppState {
    /// Creates a new `AppState` instance.
    #[must_use]
    pub const fn new(
        db: PgPool,
        cache: RedisPool,
        queue: TaskQueue,
        linkedin: LinkedInClient,
        cookie_key: Key,
    ) -> Self {
        Self {
            db,
            cache,
            queue,
            linkedin,
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
