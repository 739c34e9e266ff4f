//! Prompt input types.

use serde::{Deserialize, Serialize};

/// A retrieved context chunk as presented to the model.
///
/// `key` is the stable citation key the model is instructed to cite with;
/// the engine uses the chunk id so citations can be mapped back without
/// any extra bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    /// Citation key (the chunk id)
    pub key: String,

    /// Human-readable document name
    pub doc_name: String,

    /// 1-based page number
    pub page: u32,

    /// Chunk text
    pub text: String,
}

/// A candidate answer fed into the merge prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateBlock {
    /// Display label ("A", "B")
    pub label: String,

    /// Candidate answer text
    pub text: String,
}
