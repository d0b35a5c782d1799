//! Root, probe and static page handlers.

use askama::Template;
use axum::{extract::State, http::StatusCode, response::Html, Json};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::api::state::AppState;
use crate::config::APP_CONFIG;

/// Privacy policy page template.
#[derive(Template)]
#[template(path = "privacy_policy.html")]
struct PrivacyPolicyTemplate<'a> {
    app_name: &'a str,
    contact_url: &'a str,
}

/// Pre-rendered privacy policy HTML (static content).
static PRIVACY_POLICY_HTML: Lazy<String> = Lazy::new(|| {
    PrivacyPolicyTemplate {
        app_name: &APP_CONFIG.app_name,
        contact_url: &APP_CONFIG.base_url,
    }
    .render()
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to render privacy policy template");
        String::from("<html><body><h1>Privacy Policy</h1></body></html>")
    })
});

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
}

/// `GET /`
pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: format!("{} API is running", APP_CONFIG.app_name),
    })
}

/// `GET /privacy-policy`
pub async fn privacy_policy_handler() -> Html<&'static str> {
    Html(PRIVACY_POLICY_HTML.as_str())
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe handler.
///
/// Returns OK if the server is running.
///
/// # Route
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cache: &'static str,
}

impl ReadinessResponse {
    pub const fn from_checks(db_ok: bool, cache_ok: bool) -> Self {
        const fn label(ok: bool) -> &'static str {
            if ok {
                "connected"
            } else {
                "disconnected"
            }
        }

        Self {
            status: if db_ok && cache_ok { "ok" } else { "degraded" },
            database: label(db_ok),
            cache: label(cache_ok),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness probe handler.
///
/// Checks database and Redis connectivity; the worker shares both.
///
/// # Route
///
/// `GET /ready`
pub async fn readiness_handler(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.db).await.is_ok();
    let cache_ok = state.cache.get().await.is_ok();

    let response = ReadinessResponse::from_checks(db_ok, cache_ok);
    if response.is_ready() {
        Ok(Json(response))
    } else {
        tracing::warn!(database = db_ok, cache = cache_ok, "Readiness check failed");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_root_handler_message() {
        let Json(response) = root_handler().await;
        assert!(response.message.ends_with("API is running"));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(response) = health_handler().await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_privacy_policy_renders() {
        let Html(body) = privacy_policy_handler().await;
        assert!(body.contains("Privacy Policy"));
    }

    #[test]
    fn test_readiness_all_connected() {
        let response = ReadinessResponse::from_checks(true, true);
        assert!(response.is_ready());
        assert_eq!(response.database, "connected");
        assert_eq!(response.cache, "connected");
    }

    #[test]
    fn test_readiness_degraded() {
        let response = ReadinessResponse::from_checks(true, false);
        assert!(!response.is_ready());
        assert_eq!(response.status, "degraded");
        assert_eq!(response.cache, "disconnected");
    }
}
