//! Command handlers for the Diligence CLI.
//!
//! This module organizes all CLI commands into separate submodules and
//! holds the shared engine construction helper.

pub mod answer;
pub mod document;
pub mod project;
pub mod search;
pub mod status;

// Re-export command types for convenience
pub use answer::AnswerCommand;
pub use document::DocumentCommand;
pub use project::ProjectCommand;
pub use search::SearchCommand;
pub use status::StatusCommand;

use diligence_core::{AppResult, EngineConfig};
use diligence_engine::{create_provider, Engine, SqliteStore};
use std::sync::Arc;

/// Wire up an engine from configuration: store, embedding provider, and
/// LLM client.
pub fn build_engine(config: &EngineConfig) -> AppResult<Engine> {
    let store = Arc::new(SqliteStore::open(&config.store_path)?);
    let embedder = create_provider(config)?;
    let llm = diligence_llm::create_client(
        &config.provider,
        config.endpoint.as_deref(),
        config.api_key.as_deref(),
    )?;

    Engine::new(config.clone(), store, embedder, llm)
}
