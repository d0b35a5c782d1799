//! AI content generation workflow.

pub mod prompts;
pub mod state;
pub mod workflow;

pub use state::{ContentOutput, ContentRequest, ContentState};
pub use workflow::{entry_route, human_review_gate, ContentWorkflow, Decision, Node};
