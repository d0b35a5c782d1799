//! Prompt templates for each workflow node.

use super::state::ContentState;

fn or_empty(value: Option<&String>) -> &str {
    value.map_or("", String::as_str)
}

pub fn analyze_audience(state: &ContentState) -> String {
    let req = &state.request;
    format!(
        "You are a content marketing strategist. Your task is to write a creative brief for a copywriter.\n\
         Based on the information below, define a clear angle, 3 key points to cover and the main goal of the post.\n\n\
         Account: {}\n\
         Niche/Audience: {}\n\
         Desired tone: {}\n\
         User request: {}\n\
         Relevant link: {}\n\n\
         Creative brief:",
        req.account_name,
        req.niche,
        req.tone,
        req.query,
        req.link_url.as_deref().unwrap_or(""),
    )
}

pub fn draft_post(state: &ContentState) -> String {
    format!(
        "You are a creative copywriter specialised in LinkedIn. Using the brief below, write an engaging, high quality draft.\n\
         Focus on a strong hook and a clear development. Your answer MUST be the draft only.\n\n\
         Brief:\n{}\n\n\
         Post draft:",
        or_empty(state.creative_brief.as_ref()),
    )
}

pub fn refine_for_engagement(state: &ContentState, content_to_refine: &str) -> String {
    format!(
        "You are an engagement specialist. Your main task is to apply the corrections requested by the user.\n\
         If there is no user feedback, apply the reviewer notes.\n\
         Improve the draft to maximise interactions.\n\
         **User feedback (TOP PRIORITY):**\n{}\n\
         **Reviewer notes (if there is no user feedback):**\n{}\n\
         **Text to improve:**\n{}\n\
         Your answer MUST be the refined draft only.\n\
         Refined draft:",
        state
            .pending_feedback()
            .unwrap_or("N/A. Improve overall engagement."),
        state.review_notes.as_deref().unwrap_or("N/A"),
        content_to_refine,
    )
}

pub fn finalize_and_format(state: &ContentState) -> String {
    format!(
        "You are a content editor. Polish the following text for publication on LinkedIn.\n\
         1. Fix grammar and style.\n\
         2. Add 2-3 relevant emojis.\n\
         3. Add 3-5 strategic hashtags at the end.\n\
         4. Keep the formatting clean with short paragraphs.\n\n\
         Text to finalize:\n{}\n\n\
         IMPORTANT: answer ONLY with the finished post, without preambles such as \"Here is the post:\".\n\n\
         Final post:",
        or_empty(state.refined_content.as_ref()),
    )
}

pub fn extract_final_post(state: &ContentState) -> String {
    format!(
        "Analyse the following text. It contains a social media post but may include unwanted introductory text.\n\
         Your only task is to extract the post itself, from its first word to its last hashtag, and nothing else.\n\
         If the text already is just the post, return it unchanged.\n\n\
         Text to clean:\n---\n{}\n---\n\n\
         Extracted post:",
        or_empty(state.formatted_output.as_ref()),
    )
}

pub fn quality_gate(state: &ContentState) -> String {
    format!(
        "You are a very demanding marketing director. Evaluate the following LinkedIn post against the original brief.\n\
         Is the post engaging, assertive and does it meet every goal?\n\
         Answer ONLY with one of these options:\n\
         - \"APPROVED\" if the post is excellent and ready to publish.\n\
         - \"NEEDS IMPROVEMENT: [briefly describe what is missing, e.g. 'The CTA is unclear' or 'The tone is too formal']\" if it needs changes.\n\n\
         Original brief:\n{}\n\
         Proposed post:\n{}\n\n\
         Your verdict:",
        or_empty(state.creative_brief.as_ref()),
        or_empty(state.final_post.as_ref()),
    )
}
