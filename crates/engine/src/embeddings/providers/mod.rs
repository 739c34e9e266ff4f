//! Embedding provider implementations.

pub mod hashed_ngram;
pub mod ollama;

pub use hashed_ngram::HashedNgramProvider;
pub use ollama::OllamaEmbeddingProvider;
