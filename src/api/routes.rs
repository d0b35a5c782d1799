//! Route configuration module.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::api::handlers::{
    callback_handler, generate_post_handler, generation_status_handler, health_handler,
    kpis_handler, login_handler, logout_handler, me_handler, organizations_handler,
    privacy_policy_handler, readiness_handler, resume_generation_handler, root_handler,
    schedule_post_handler, task_status_handler, timeseries_handler, trigger_etl_handler,
};
use crate::api::middlewares::session_auth;
use crate::api::state::AppState;

/// Creates and configures all application routes.
///
/// # Routes
///
/// ## Public
/// - `GET /` - API banner
/// - `GET /health` - Liveness probe
/// - `GET /ready` - Readiness probe
/// - `GET /privacy-policy` - Privacy policy page
/// - `GET /auth/login/{provider}` - Start OAuth login
/// - `GET /auth/callback/{provider}` - OAuth redirect target
/// - `GET /auth/me` - Current session
/// - `GET /auth/logout` - End session
///
/// ## Session required
/// - `POST /content/schedule_post`
/// - `POST /content/generate_post`
/// - `GET /content/generate_post/status/{task_id}`
/// - `POST /content/generate_post/resume`
/// - `POST /analytics/trigger_etl`
/// - `GET /analytics/tasks/status/{task_id}`
/// - `GET /analytics/timeseries`
/// - `GET /analytics/kpis`
/// - `GET /accounts/linkedin/organizations`
pub fn create_routes(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login/{provider}", get(login_handler))
        .route("/callback/{provider}", get(callback_handler))
        .route("/me", get(me_handler))
        .route("/logout", get(logout_handler));

    let content_routes = Router::new()
        .route("/schedule_post", post(schedule_post_handler))
        .route("/generate_post", post(generate_post_handler))
        .route(
            "/generate_post/status/{task_id}",
            get(generation_status_handler),
        )
        .route("/generate_post/resume", post(resume_generation_handler));

    let analytics_routes = Router::new()
        .route("/trigger_etl", post(trigger_etl_handler))
        .route("/tasks/status/{task_id}", get(task_status_handler))
        .route("/timeseries", get(timeseries_handler))
        .route("/kpis", get(kpis_handler));

    let protected_routes = Router::new()
        .nest("/content", content_routes)
        .nest("/analytics", analytics_routes)
        .route(
            "/accounts/linkedin/organizations",
            get(organizations_handler),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), session_auth));

    Router::new()
        // Health check routes (no auth required)
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        .route("/", get(root_handler))
        .route("/privacy-policy", get(privacy_policy_handler))
        .nest("/auth", auth_routes)
        .merge(protected_routes)
        .with_state(state)
}
