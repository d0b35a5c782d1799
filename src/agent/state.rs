//! Workflow state carried between nodes and stored as a checkpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub query: String,
    pub tone: String,
    pub niche: String,
    pub account_name: String,
    #[serde(default)]
    pub link_url: Option<String>,
    /// Pause for a human verdict after each run instead of finishing.
    #[serde(default)]
    pub human_review: bool,
}

/// Full internal state of a content generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentState {
    pub request: ContentRequest,
    #[serde(default)]
    pub creative_brief: Option<String>,
    #[serde(default)]
    pub draft_content: Option<String>,
    #[serde(default)]
    pub refined_content: Option<String>,
    #[serde(default)]
    pub formatted_output: Option<String>,
    #[serde(default)]
    pub final_post: Option<String>,
    #[serde(default)]
    pub review_notes: Option<String>,
    #[serde(default)]
    pub revision_cycles: u32,
    #[serde(default)]
    pub human_feedback: Option<String>,
    #[serde(default)]
    pub token_usage_by_node: BTreeMap<String, u64>,
    #[serde(default)]
    pub total_tokens: u64,
}

impl ContentState {
    pub fn new(request: ContentRequest) -> Self {
        Self {
            request,
            creative_brief: None,
            draft_content: None,
            refined_content: None,
            formatted_output: None,
            final_post: None,
            review_notes: None,
            revision_cycles: 0,
            human_feedback: None,
            token_usage_by_node: BTreeMap::new(),
            total_tokens: 0,
        }
    }

    /// Adds a node's token cost. Zero-cost calls leave no entry.
    pub fn record_tokens(&mut self, node: &str, tokens: u64) {
        if tokens == 0 {
            return;
        }
        *self.token_usage_by_node.entry(node.to_string()).or_insert(0) += tokens;
        self.total_tokens += tokens;
    }

    /// Feedback that is present and not blank.
    pub fn pending_feedback(&self) -> Option<&str> {
        self.human_feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    pub fn output(&self) -> ContentOutput {
        ContentOutput {
            final_post: self.final_post.clone().unwrap_or_default(),
            token_usage_per_node: self.token_usage_by_node.clone(),
            total_tokens_used: self.total_tokens,
            revision_cycles: self.revision_cycles,
        }
    }
}

/// Result returned to API clients when generation finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentOutput {
    pub final_post: String,
    pub token_usage_per_node: BTreeMap<String, u64>,
    pub total_tokens_used: u64,
    pub revision_cycles: u32,
}
