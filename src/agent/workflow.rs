//! Content generation graph.
//!
//! ```text
//! entry ─┬─> analyze_audience ─> draft_post ─┐
//!        └───────────────────────────────────┴─> refine_for_engagement
//!            ─> finalize_and_format ─> extract_final_post ─> quality_gate
//!            quality_gate: approved or cycle limit -> end, otherwise -> refine
//! ```

use std::fmt;
use std::sync::Arc;

use super::prompts;
use super::state::ContentState;
use crate::error::AppResult;
use crate::llm::{LlmClient, ModelTier};

/// Verdict prefix the reviewer model uses to approve a post.
const APPROVAL_PREFIX: &str = "APPROVED";
const APPROVED_NOTE: &str = "Approved by quality control.";

/// Words a human reviewer can send to accept the current post.
const HUMAN_APPROVAL_WORDS: &[&str] = &["approve", "approved", "aprobar"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    AnalyzeAudience,
    DraftPost,
    RefineForEngagement,
    FinalizeAndFormat,
    ExtractFinalPost,
}

impl Node {
    pub const fn name(self) -> &'static str {
        match self {
            Self::AnalyzeAudience => "analyze_audience",
            Self::DraftPost => "draft_post",
            Self::RefineForEngagement => "refine_for_engagement",
            Self::FinalizeAndFormat => "finalize_and_format",
            Self::ExtractFinalPost => "extract_final_post",
        }
    }

    const fn tier(self) -> ModelTier {
        match self {
            Self::AnalyzeAudience | Self::DraftPost | Self::RefineForEngagement => ModelTier::Pro,
            Self::FinalizeAndFormat | Self::ExtractFinalPost => ModelTier::Flash,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a review step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    End,
    Refine,
}

/// Where a run starts: straight to refinement when a human left feedback.
pub fn entry_route(state: &ContentState) -> Node {
    if state.pending_feedback().is_some() {
        Node::RefineForEngagement
    } else {
        Node::AnalyzeAudience
    }
}

/// Decides what to do with human feedback on a paused run.
pub fn human_review_gate(feedback: Option<&str>) -> Decision {
    let feedback = feedback.map(|f| f.trim().to_lowercase()).unwrap_or_default();
    if feedback.is_empty() || HUMAN_APPROVAL_WORDS.contains(&feedback.as_str()) {
        Decision::End
    } else {
        Decision::Refine
    }
}

/// Interprets the reviewer model's verdict.
pub fn parse_verdict(verdict: &str) -> Decision {
    if verdict.trim().to_uppercase().starts_with(APPROVAL_PREFIX) {
        Decision::End
    } else {
        Decision::Refine
    }
}

/// Runs the content graph against an LLM.
pub struct ContentWorkflow {
    llm: Arc<dyn LlmClient>,
    max_revision_cycles: u32,
}

impl ContentWorkflow {
    pub fn new(llm: Arc<dyn LlmClient>, max_revision_cycles: u32) -> Self {
        Self {
            llm,
            max_revision_cycles,
        }
    }

    /// Runs from the entry route until the quality gate ends the graph.
    pub async fn run(&self, mut state: ContentState) -> AppResult<ContentState> {
        let mut next = Some(entry_route(&state));

        while let Some(node) = next {
            tracing::debug!(node = %node, revision_cycles = state.revision_cycles, "Running node");
            self.run_node(node, &mut state).await?;

            next = match node {
                Node::AnalyzeAudience => Some(Node::DraftPost),
                Node::DraftPost => Some(Node::RefineForEngagement),
                Node::RefineForEngagement => Some(Node::FinalizeAndFormat),
                Node::FinalizeAndFormat => Some(Node::ExtractFinalPost),
                Node::ExtractFinalPost => match self.quality_gate(&mut state).await? {
                    Decision::End => None,
                    Decision::Refine => Some(Node::RefineForEngagement),
                },
            };
        }

        tracing::info!(
            revision_cycles = state.revision_cycles,
            total_tokens = state.total_tokens,
            "Content workflow finished"
        );
        Ok(state)
    }

    async fn run_node(&self, node: Node, state: &mut ContentState) -> AppResult<()> {
        let prompt = match node {
            Node::AnalyzeAudience => prompts::analyze_audience(state),
            Node::DraftPost => prompts::draft_post(state),
            Node::RefineForEngagement => {
                state.revision_cycles += 1;
                let source = if state.revision_cycles > 1 {
                    state.refined_content.as_ref().or(state.draft_content.as_ref())
                } else {
                    state.draft_content.as_ref()
                };
                let source = source.cloned().unwrap_or_default();
                prompts::refine_for_engagement(state, &source)
            }
            Node::FinalizeAndFormat => prompts::finalize_and_format(state),
            Node::ExtractFinalPost => prompts::extract_final_post(state),
        };

        let completion = self.llm.generate(node.tier(), &prompt).await?;
        state.record_tokens(node.name(), completion.total_tokens);

        let text = Some(completion.text);
        match node {
            Node::AnalyzeAudience => state.creative_brief = text,
            Node::DraftPost => state.draft_content = text,
            Node::RefineForEngagement => {
                state.refined_content = text;
                state.human_feedback = None;
            }
            Node::FinalizeAndFormat => state.formatted_output = text,
            Node::ExtractFinalPost => state.final_post = text,
        }
        Ok(())
    }

    async fn quality_gate(&self, state: &mut ContentState) -> AppResult<Decision> {
        if state.revision_cycles > self.max_revision_cycles {
            tracing::info!(
                revision_cycles = state.revision_cycles,
                "Revision limit reached, accepting post"
            );
            return Ok(Decision::End);
        }

        let completion = self
            .llm
            .generate(ModelTier::Flash, &prompts::quality_gate(state))
            .await?;
        state.record_tokens("quality_gate", completion.total_tokens);

        let decision = parse_verdict(&completion.text);
        match decision {
            Decision::End => state.review_notes = Some(APPROVED_NOTE.to_string()),
            Decision::Refine => {
                tracing::info!(notes = %completion.text.trim(), "Quality gate requested changes");
                state.review_notes = Some(completion.text);
            }
        }
        Ok(decision)
    }
}
