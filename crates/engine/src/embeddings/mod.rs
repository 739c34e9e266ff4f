//! Embedding providers.
//!
//! The same provider instance must serve both indexing and query
//! embedding; mixing vector spaces is a correctness bug the engine does
//! not defend against.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{HashedNgramProvider, OllamaEmbeddingProvider};
