//! API module.
//!
//! Contains HTTP handlers, routes, schemas, and middleware.

pub mod handlers;
pub mod middlewares;
pub mod routes;
pub mod schemas;
pub mod state;

pub use handlers::{HealthResponse, ReadinessResponse, RootResponse};
pub use routes::create_routes;
pub use state::AppState;
