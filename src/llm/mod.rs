//! Language model clients.

pub mod gemini;

use async_trait::async_trait;

use crate::error::AppResult;

pub use gemini::GeminiClient;

/// Which model a workflow step runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Larger model for creative steps.
    Pro,
    /// Cheaper model for formatting, extraction and review.
    Flash,
}

/// Generated text plus the tokens it cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u64,
}

impl Completion {
    pub fn new(text: impl Into<String>, total_tokens: u64) -> Self {
        Self {
            text: text.into(),
            total_tokens,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, tier: ModelTier, prompt: &str) -> AppResult<Completion>;
}
