//! Deterministic local embeddings from hashed character trigrams.
//!
//! Not semantically comparable to a neural embedding model, but
//! content-aware, deterministic, and dependency-free: identical text maps
//! to identical unit vectors, and lexically similar text lands close.
//! Default for tests and offline operation.

use crate::embeddings::provider::EmbeddingProvider;
use diligence_core::AppResult;

/// Words too common to carry signal; skipped before hashing.
const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

/// Local deterministic embedding provider.
#[derive(Debug)]
pub struct HashedNgramProvider {
    dimensions: usize,
}

impl HashedNgramProvider {
    /// Create a provider with the given output dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let lower = text.to_lowercase();
        let stop_words: std::collections::HashSet<&str> = STOP_WORDS.iter().copied().collect();

        let words: Vec<&str> = lower
            .split_whitespace()
            .filter(|w| !stop_words.contains(w) && w.len() > 2)
            .collect();

        let mut word_freq = std::collections::HashMap::new();
        for word in &words {
            *word_freq.entry(*word).or_insert(0u32) += 1;
        }

        for (word, freq) in &word_freq {
            // Character trigrams spread each word over several dimensions
            let chars: Vec<char> = word.chars().collect();
            for i in 0..chars.len().saturating_sub(2) {
                let trigram = format!("{}{}{}", chars[i], chars[i + 1], chars[i + 2]);
                let dim_idx = hash_bytes(trigram.as_bytes(), 37) as usize % self.dimensions;
                embedding[dim_idx] += (*freq as f32).sqrt();
            }

            // Whole-word dimension
            let dim_idx = hash_bytes(word.as_bytes(), 31) as usize % self.dimensions;
            embedding[dim_idx] += *freq as f32;
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

fn hash_bytes(bytes: &[u8], mult: u64) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, b| acc.wrapping_mul(mult).wrapping_add(*b as u64))
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashedNgramProvider {
    fn provider_name(&self) -> &str {
        "hashed-ngram"
    }

    fn model_name(&self) -> &str {
        "hashed-ngram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::provider::EmbeddingProvider;

    #[tokio::test]
    async fn test_dimensions() {
        let provider = HashedNgramProvider::new(384);
        assert_eq!(provider.dimensions(), 384);

        let embedding = provider.embed("hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }

    #[tokio::test]
    async fn test_unit_normalized() {
        let provider = HashedNgramProvider::new(384);
        let embedding = provider.embed("governance structure overview").await.unwrap();

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = HashedNgramProvider::new(384);
        let a = provider.embed("deterministic embedding test").await.unwrap();
        let b = provider.embed("deterministic embedding test").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_different_texts_differ() {
        let provider = HashedNgramProvider::new(384);
        let a = provider.embed("credit facility covenants").await.unwrap();
        let b = provider.embed("environmental compliance report").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = HashedNgramProvider::new(384);
        let embedding = provider.embed("").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_order_preserved() {
        let provider = HashedNgramProvider::new(64);
        let texts = vec![
            "first text".to_string(),
            "second text".to_string(),
            "third text".to_string(),
        ];

        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], provider.embed("first text").await.unwrap());
        assert_eq!(batch[2], provider.embed("third text").await.unwrap());
    }

    #[tokio::test]
    async fn test_utf8_safety() {
        let provider = HashedNgramProvider::new(384);
        let embedding = provider
            .embed("Jahresabschluss prüfen — Fälligkeit übernächstes Jahr 🎯")
            .await
            .unwrap();
        assert_eq!(embedding.len(), 384);
    }
}
