//! Answer synthesis pipeline.
//!
//! Dual-candidate-plus-merge strategy: two candidate completions run
//! concurrently over an identical prompt at different temperatures, then
//! one merge completion consolidates them into a cited, confidence-scored
//! answer. Candidate failures degrade gracefully (a lone survivor still
//! goes through the merge step so citation numbering and confidence
//! extraction are normalized); only the loss of both candidates, a merge
//! failure, or an unparsable merge output fail the pipeline.

pub mod parser;

use std::sync::Arc;
use std::time::Duration;

use diligence_core::{AppError, AppResult, EngineConfig};
use diligence_llm::{complete_with_retry, LlmClient, LlmRequest, RetryPolicy};
use diligence_prompt::{render_answer_prompt, render_merge_prompt, CandidateBlock, ContextBlock};

use crate::types::{Answerability, Citation, RetrievedChunk};

/// Knobs for one synthesis run, lifted from the engine config.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub model: String,
    pub temperature_precise: f32,
    pub temperature_exploratory: f32,
    pub temperature_merge: f32,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

impl SynthesisConfig {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature_precise: config.temperature_precise,
            temperature_exploratory: config.temperature_exploratory,
            temperature_merge: config.temperature_merge,
            max_tokens: config.max_tokens,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff: Duration::from_millis(config.backoff_ms),
                timeout: Duration::from_secs(config.call_timeout_secs),
            },
        }
    }
}

/// Everything the pipeline produces for a successful run.
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub ai_answer: String,
    pub variant_a: Option<String>,
    pub variant_b: Option<String>,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub answerability: Answerability,
}

/// The dual-candidate-plus-merge pipeline.
pub struct SynthesisPipeline {
    llm: Arc<dyn LlmClient>,
    config: SynthesisConfig,
}

impl SynthesisPipeline {
    pub fn new(llm: Arc<dyn LlmClient>, config: SynthesisConfig) -> Self {
        Self { llm, config }
    }

    /// Run the full pipeline for one question over its retrieved context.
    pub async fn synthesize(
        &self,
        question_text: &str,
        context: &[RetrievedChunk],
    ) -> AppResult<SynthesisOutcome> {
        let blocks = context_blocks(context);
        let prompt = render_answer_prompt(question_text, &blocks)?;

        // Step 1: both candidates in flight concurrently; the join resolves
        // once each has settled (value or exhausted retries)
        let (variant_a, variant_b) = tokio::join!(
            self.candidate(&prompt, self.config.temperature_precise, "precise"),
            self.candidate(&prompt, self.config.temperature_exploratory, "exploratory"),
        );

        // Step 2: degenerate-case policy
        let mut candidates = Vec::new();
        if let Some(text) = &variant_a {
            candidates.push(CandidateBlock {
                label: "A".to_string(),
                text: text.clone(),
            });
        }
        if let Some(text) = &variant_b {
            candidates.push(CandidateBlock {
                label: "B".to_string(),
                text: text.clone(),
            });
        }

        if candidates.is_empty() {
            return Err(AppError::Generation(
                "Both candidate calls failed after retries".to_string(),
            ));
        }

        tracing::debug!(
            "{} candidate(s) survived; running merge",
            candidates.len()
        );

        // Step 3: merge
        let merge_prompt = render_merge_prompt(question_text, &candidates, &blocks)?;
        let merge_request = LlmRequest::new(merge_prompt, self.config.model.clone())
            .with_temperature(self.config.temperature_merge)
            .with_max_tokens(self.config.max_tokens);

        let merged = complete_with_retry(self.llm.as_ref(), &merge_request, &self.config.retry)
            .await
            .map_err(|e| AppError::Generation(format!("Merge call failed: {}", e)))?;

        let parsed = parser::parse_merge_output(&merged.content, context)?;

        tracing::info!(
            "Synthesized answer ({} citations, confidence {:.2}, answerable: {})",
            parsed.citations.len(),
            parsed.confidence,
            parsed.answerability.as_str()
        );

        Ok(SynthesisOutcome {
            ai_answer: parsed.text,
            variant_a,
            variant_b,
            citations: parsed.citations,
            confidence: parsed.confidence,
            answerability: parsed.answerability,
        })
    }

    /// One candidate call; absent (not fatal) when retries are exhausted.
    async fn candidate(&self, prompt: &str, temperature: f32, label: &str) -> Option<String> {
        let request = LlmRequest::new(prompt.to_string(), self.config.model.clone())
            .with_temperature(temperature)
            .with_max_tokens(self.config.max_tokens);

        match complete_with_retry(self.llm.as_ref(), &request, &self.config.retry).await {
            Ok(response) => Some(response.content),
            Err(e) => {
                tracing::warn!("Candidate call '{}' failed: {}", label, e);
                None
            }
        }
    }
}

/// Map retrieved chunks into prompt context blocks, most relevant first.
pub fn context_blocks(context: &[RetrievedChunk]) -> Vec<ContextBlock> {
    context
        .iter()
        .map(|r| ContextBlock {
            key: r.chunk.id.clone(),
            doc_name: r.chunk.doc_name.clone(),
            page: r.chunk.page,
            text: r.chunk.text.clone(),
        })
        .collect()
}
