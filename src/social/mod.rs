//! Social platform API clients.
//!
//! Shared outbound HTTP client and the retry policy every platform call goes
//! through.

pub mod linkedin;

use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::{RequestBuilder, Response};

use crate::config::APP_CONFIG;
use crate::error::{AppError, AppResult};

pub use linkedin::{Account, LinkedInClient, PageInsights, TokenResponse};

/// Global HTTP client with timeout and connection pooling.
pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(APP_CONFIG.http_timeout_secs))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(60))
        .user_agent(concat!("social-media-suite/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
});

/// How many times a platform call is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    pub fn from_config() -> Self {
        Self::new(
            APP_CONFIG.http_retry_attempts.max(1),
            Duration::from_secs(APP_CONFIG.http_retry_delay_secs),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up. The last error is returned.
pub async fn with_retry<T, F, Fut>(name: &str, policy: RetryPolicy, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                tracing::debug!(call = name, attempt, "API call succeeded");
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    call = name,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "API call failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(call = name, attempt, error = %e, "API call failed");
                return Err(e);
            }
        }
    }
}

/// Sends a request and turns any non-2xx status into `AppError::Upstream`.
pub async fn send(request: RequestBuilder) -> AppResult<Response> {
    let response = request.send().await?;
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::Upstream {
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

/// Sends a request and parses the body as JSON.
///
/// A successful response whose body is not JSON yields `None`.
pub async fn send_json(request: RequestBuilder) -> AppResult<Option<serde_json::Value>> {
    let response = send(request).await?;
    let text = response.text().await?;
    match serde_json::from_str(&text) {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            tracing::warn!(body = %truncate(&text, 100), "API returned a non-JSON body");
            Ok(None)
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
