//! Prompt rendering for the synthesis pipeline.

use crate::templates::{ANSWER_TEMPLATE, MERGE_TEMPLATE};
use crate::types::{CandidateBlock, ContextBlock};
use diligence_core::{AppError, AppResult};
use handlebars::Handlebars;

/// Render the candidate answer prompt.
///
/// The same rendered prompt is used for both parallel candidate calls.
pub fn render_answer_prompt(question: &str, context: &[ContextBlock]) -> AppResult<String> {
    tracing::debug!("Rendering candidate prompt over {} context chunks", context.len());

    let first_key = context.first().map(|c| c.key.as_str()).unwrap_or("KEY");

    let data = serde_json::json!({
        "question": question,
        "context": context,
        "first_key": first_key,
    });

    render_template(ANSWER_TEMPLATE, &data)
}

/// Render the merge prompt for one or two surviving candidates.
pub fn render_merge_prompt(
    question: &str,
    candidates: &[CandidateBlock],
    context: &[ContextBlock],
) -> AppResult<String> {
    tracing::debug!("Rendering merge prompt for {} candidate(s)", candidates.len());

    let data = serde_json::json!({
        "question": question,
        "candidates": candidates,
        "context": context,
    });

    render_template(MERGE_TEMPLATE, &data)
}

/// Render a Handlebars template with the given data.
fn render_template(template: &str, data: &serde_json::Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Generation(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Generation(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}
