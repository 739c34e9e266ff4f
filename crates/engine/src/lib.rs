//! Retrieval & answer-synthesis engine for due-diligence questionnaires.
//!
//! Documents arrive as (page, text) sequences, are chunked into
//! overlapping windows, embedded, and indexed; questions are answered by
//! retrieving relevant chunks and running a dual-candidate-plus-merge LLM
//! pipeline that produces cited, confidence-scored answers subject to
//! human review.

pub mod chunker;
pub mod embeddings;
pub mod engine;
pub mod index;
pub mod retriever;
pub mod review;
pub mod store;
pub mod synthesis;
pub mod types;

// Re-export commonly used types
pub use chunker::Chunker;
pub use embeddings::{create_provider, EmbeddingProvider, HashedNgramProvider};
pub use engine::Engine;
pub use index::{SearchMode, VectorIndex};
pub use retriever::Retriever;
pub use review::{apply_review, ReviewAction};
pub use store::SqliteStore;
pub use synthesis::{SynthesisConfig, SynthesisOutcome, SynthesisPipeline};
pub use types::{
    Answer, AnswerStatus, Answerability, BatchError, BatchReport, Chunk, ChunkDraft, Citation,
    Document, DocumentStatus, EngineStatus, PageText, Project, ProjectStatus, Question,
    QuestionSpec, RetrievedChunk,
};
