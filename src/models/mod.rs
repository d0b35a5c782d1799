//! Model module.
//!
//! Contains domain entities and repository pattern for data access.

pub mod metrics;
pub mod platform;
pub mod session;

pub use metrics::*;
pub use platform::Platform;
pub use session::*;
