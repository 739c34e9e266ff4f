//! Embedding provider trait and factory.

use diligence_core::{AppError, AppResult, EngineConfig};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "hashed-ngram", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Indexing("No embedding returned".to_string()))
    }
}

/// Create an embedding provider based on configuration.
pub fn create_provider(config: &EngineConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match config.embedding_provider.as_str() {
        "hashed-ngram" => Ok(Arc::new(super::providers::HashedNgramProvider::new(
            config.embedding_dimensions,
        ))),

        "ollama" => Ok(Arc::new(super::providers::OllamaEmbeddingProvider::new(
            config.endpoint.as_deref(),
            &config.embedding_model,
            config.embedding_dimensions,
        ))),

        other => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: hashed-ngram, ollama",
            other
        ))),
    }
}
