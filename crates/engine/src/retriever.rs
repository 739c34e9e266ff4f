//! Question-to-context retrieval.
//!
//! Embeds the question with the same provider used at indexing time and
//! ranks chunks from the vector index. Pure with respect to (index state,
//! question, scope) apart from the approximate-search caveat documented
//! on [`crate::index::VectorIndex`].

use std::collections::HashSet;
use std::sync::Arc;

use diligence_core::{AppError, AppResult};

use crate::embeddings::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::types::RetrievedChunk;

/// Turns a question into a ranked set of context chunks.
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, embedder }
    }

    /// Retrieve up to `k` chunks relevant to `question_text`.
    ///
    /// Fails with a retrieval error if `scope` is non-empty but none of the
    /// scoped documents are indexed. An empty scope set returns no chunks.
    pub async fn retrieve(
        &self,
        question_text: &str,
        k: usize,
        scope: Option<&HashSet<String>>,
    ) -> AppResult<Vec<RetrievedChunk>> {
        if let Some(scope) = scope {
            if !scope.is_empty() && !scope.iter().any(|doc| self.index.contains_document(doc)) {
                return Err(AppError::Retrieval(
                    "None of the scoped documents are indexed".to_string(),
                ));
            }
        }

        let query_embedding = self.embedder.embed(question_text).await?;
        let results = self.index.search(&query_embedding, k, scope);

        if results.is_empty() {
            tracing::debug!("No chunks retrieved for question");
        } else {
            tracing::debug!(
                "Retrieved {} chunks (top score: {:.3}, lowest: {:.3})",
                results.len(),
                results.first().map(|r| r.score).unwrap_or(0.0),
                results.last().map(|r| r.score).unwrap_or(0.0)
            );
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashedNgramProvider;
    use crate::index::SearchMode;
    use crate::types::Chunk;

    async fn build_retriever(docs: &[(&str, &[&str])]) -> Retriever {
        let index = Arc::new(VectorIndex::new(SearchMode::Exact));
        let embedder = Arc::new(HashedNgramProvider::new(128));

        for (doc_id, texts) in docs {
            let mut chunks = Vec::new();
            for (i, text) in texts.iter().enumerate() {
                let embedding = embedder.embed(text).await.unwrap();
                chunks.push(Chunk {
                    id: format!("{}_c{}", doc_id, i),
                    doc_id: doc_id.to_string(),
                    doc_name: format!("{}.pdf", doc_id),
                    page: 1,
                    chunk_index: i as u32,
                    text: text.to_string(),
                    embedding,
                });
            }
            index.index_document(doc_id, chunks).unwrap();
        }

        Retriever::new(index, embedder)
    }

    #[tokio::test]
    async fn test_retrieves_most_relevant_first() {
        let retriever = build_retriever(&[(
            "d1",
            &[
                "The credit facility carries a leverage covenant of 3.5x",
                "Employee handbook vacation policy and public holidays",
            ],
        )])
        .await;

        let results = retriever
            .retrieve("What is the leverage covenant on the credit facility?", 2, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.text.contains("leverage covenant"));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_scoped_retrieval_requires_indexed_document() {
        let retriever = build_retriever(&[("d1", &["some indexed text"])]).await;

        let missing: HashSet<String> = ["ghost".to_string()].into_iter().collect();
        let result = retriever.retrieve("anything", 5, Some(&missing)).await;
        assert!(matches!(result, Err(AppError::Retrieval(_))));
    }

    #[tokio::test]
    async fn test_scope_mixing_indexed_and_missing_is_allowed() {
        let retriever = build_retriever(&[("d1", &["contract terms and conditions"])]).await;

        let scope: HashSet<String> = ["d1".to_string(), "ghost".to_string()].into_iter().collect();
        let results = retriever.retrieve("contract terms", 5, Some(&scope)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.doc_id, "d1");
    }

    #[tokio::test]
    async fn test_empty_scope_returns_empty() {
        let retriever = build_retriever(&[("d1", &["text"])]).await;

        let empty = HashSet::new();
        let results = retriever.retrieve("text", 5, Some(&empty)).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let retriever = build_retriever(&[]).await;
        let results = retriever.retrieve("anything", 5, None).await.unwrap();
        assert!(results.is_empty());
    }
}
