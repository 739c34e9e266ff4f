//! Prompt templates for the Diligence synthesis pipeline.
//!
//! Two fixed prompts drive the dual-candidate-plus-merge strategy: the
//! candidate prompt (shared verbatim by both parallel calls) and the merge
//! prompt. Context chunks are labeled with their chunk id as citation key;
//! the merge prompt defines the `ANSWERABLE`/`CONFIDENCE` trailer contract
//! the engine's output parser enforces.

pub mod builder;
pub mod templates;
pub mod types;

// Re-export the public surface
pub use builder::{render_answer_prompt, render_merge_prompt};
pub use types::{CandidateBlock, ContextBlock};
