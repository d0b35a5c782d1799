//! HTTP request handler module.

pub mod analytics;
pub mod auth;
pub mod content;
pub mod system;

pub use analytics::{
    kpis_handler, organizations_handler, task_status_handler, timeseries_handler,
    trigger_etl_handler,
};
pub use auth::{callback_handler, login_handler, logout_handler, me_handler};
pub use content::{
    generation_status_handler, generate_post_handler, resume_generation_handler,
    schedule_post_handler,
};
pub use system::{
    health_handler, privacy_policy_handler, readiness_handler, root_handler, HealthResponse,
    ReadinessResponse, RootResponse,
};
