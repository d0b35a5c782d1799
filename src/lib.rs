//! Social media management backend.
//!
//! LinkedIn OAuth sessions, AI post generation with optional human review,
//! scheduled publishing and daily analytics ETL, served over HTTP with a
//! Redis-backed background worker.

pub mod agent;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod etl;
pub mod llm;
pub mod models;
pub mod social;
pub mod tasks;
pub mod utils;
