//! Top-level engine wiring the store, vector index, embeddings, and the
//! synthesis pipeline behind the operations callers see.
//!
//! The vector index has an explicit lifecycle: it is rebuilt from the
//! store's chunk rows when the engine is constructed and torn down with
//! the engine. Nothing here is a process-wide singleton; collaborators
//! arrive through the constructor.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};

use diligence_core::{AppError, AppResult, EngineConfig};
use diligence_llm::LlmClient;

use crate::chunker::Chunker;
use crate::embeddings::EmbeddingProvider;
use crate::index::{SearchMode, VectorIndex};
use crate::retriever::Retriever;
use crate::review::{apply_review, ReviewAction};
use crate::store::SqliteStore;
use crate::synthesis::{SynthesisConfig, SynthesisOutcome, SynthesisPipeline};
use crate::types::{
    Answer, AnswerStatus, Answerability, BatchError, BatchReport, Chunk, Document, DocumentStatus,
    EngineStatus, PageText, Project, ProjectStatus, Question, QuestionSpec, RetrievedChunk,
};

/// Answer text committed when generation runs against an empty index.
const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been indexed yet. Upload and index documents first.";

/// The retrieval & answer-synthesis engine.
pub struct Engine {
    store: Arc<SqliteStore>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    pipeline: SynthesisPipeline,
    config: EngineConfig,
    chunker: Chunker,
    /// Questions currently mid-generation (at most one generation each)
    generating: Mutex<HashSet<String>>,
}

/// Releases a question's generation slot on drop.
struct GenerationGuard<'a> {
    generating: &'a Mutex<HashSet<String>>,
    question_id: String,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.generating.lock().unwrap().remove(&self.question_id);
    }
}

impl Engine {
    /// Build an engine, rebuilding the in-memory vector index from the
    /// store's chunk rows.
    pub fn new(
        config: EngineConfig,
        store: Arc<SqliteStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
    ) -> AppResult<Self> {
        config.validate()?;

        let mode = if config.approximate_search {
            SearchMode::Approximate
        } else {
            SearchMode::Exact
        };
        let index = Arc::new(VectorIndex::new(mode));

        // Rebuild the index from persisted chunks
        let mut by_doc: std::collections::HashMap<String, Vec<Chunk>> =
            std::collections::HashMap::new();
        for chunk in store.load_all_chunks()? {
            by_doc.entry(chunk.doc_id.clone()).or_default().push(chunk);
        }
        let rebuilt = by_doc.len();
        for (doc_id, chunks) in by_doc {
            index.index_document(&doc_id, chunks)?;
        }
        if rebuilt > 0 {
            tracing::info!("Rebuilt vector index from {} document(s)", rebuilt);
        }

        let retriever = Retriever::new(Arc::clone(&index), Arc::clone(&embedder));
        let pipeline =
            SynthesisPipeline::new(llm, SynthesisConfig::from_engine_config(&config));
        let chunker = Chunker::new(config.chunk_window, config.chunk_overlap)?;

        Ok(Self {
            store,
            index,
            embedder,
            retriever,
            pipeline,
            config,
            chunker,
            generating: Mutex::new(HashSet::new()),
        })
    }

    // ----- documents -----

    /// Chunk, embed, and index a document's pages.
    ///
    /// Indexing is atomic per document: on any failure the document is
    /// recorded FAILED with its error message and zero chunks remain
    /// indexed. The failure is reported on the returned document record
    /// rather than raised.
    pub async fn index_document(&self, name: &str, pages: &[PageText]) -> AppResult<Document> {
        let doc_id = uuid::Uuid::new_v4().to_string();
        let content_hash = hash_pages(pages);

        if let Some(existing) = self.store.find_document_by_hash(&content_hash)? {
            tracing::warn!(
                "Content of '{}' already indexed as document {} ('{}')",
                name,
                existing.id,
                existing.name
            );
        }

        let doc = Document {
            id: doc_id.clone(),
            name: name.to_string(),
            status: DocumentStatus::Indexing,
            page_count: pages.len() as u32,
            chunk_count: 0,
            error_message: None,
            indexed_at: None,
            content_hash,
            created_at: Utc::now(),
        };
        self.store.insert_document(&doc)?;

        match self.index_document_inner(&doc_id, name, pages).await {
            Ok(chunk_count) => {
                tracing::info!(
                    "Indexed document {} ('{}'): {} pages, {} chunks",
                    doc_id,
                    name,
                    pages.len(),
                    chunk_count
                );
            }
            Err(e) => {
                tracing::error!("Indexing document {} ('{}') failed: {}", doc_id, name, e);
                self.store.mark_document_failed(&doc_id, &e.to_string())?;
            }
        }

        self.store.get_document(&doc_id)
    }

    async fn index_document_inner(
        &self,
        doc_id: &str,
        name: &str,
        pages: &[PageText],
    ) -> AppResult<usize> {
        let drafts: Vec<_> = self.chunker.chunk_pages(doc_id, name, pages).collect();

        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| AppError::Indexing(format!("Embedding failed: {}", e)))?;

        if embeddings.len() != drafts.len() {
            return Err(AppError::Indexing(format!(
                "Embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                drafts.len()
            )));
        }

        let chunks: Vec<Chunk> = drafts
            .into_iter()
            .zip(embeddings)
            .map(|(draft, embedding)| draft.with_embedding(embedding))
            .collect();

        let chunk_count = chunks.len();

        // Vector index first; roll it back if the store transaction fails
        self.index.index_document(doc_id, chunks.clone())?;
        if let Err(e) = self
            .store
            .commit_indexed_document(doc_id, &chunks, Utc::now())
        {
            self.index.remove_document(doc_id)?;
            return Err(e);
        }

        Ok(chunk_count)
    }

    /// Remove a document and its chunks everywhere. Idempotent on the
    /// index side; unknown ids are a not-found error.
    pub fn remove_document(&self, doc_id: &str) -> AppResult<()> {
        self.store.get_document(doc_id)?;
        self.index.remove_document(doc_id)?;
        self.store.delete_document(doc_id)?;
        tracing::info!("Removed document {}", doc_id);
        Ok(())
    }

    pub fn get_document(&self, doc_id: &str) -> AppResult<Document> {
        self.store.get_document(doc_id)
    }

    pub fn list_documents(&self) -> AppResult<Vec<Document>> {
        self.store.list_documents()
    }

    // ----- retrieval -----

    /// Retrieve the ranked context chunks for a question.
    pub async fn retrieve(
        &self,
        question_text: &str,
        k: usize,
        scope: Option<&HashSet<String>>,
    ) -> AppResult<Vec<RetrievedChunk>> {
        self.retriever.retrieve(question_text, k, scope).await
    }

    // ----- projects & questions -----

    /// Create a project with its questions; every question gets an empty
    /// PENDING answer record.
    pub fn create_project(
        &self,
        name: &str,
        description: &str,
        questions: Vec<QuestionSpec>,
    ) -> AppResult<Project> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Project name must not be empty".to_string()));
        }

        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            status: ProjectStatus::Draft,
            created_at: Utc::now(),
        };
        self.store.insert_project(&project)?;

        for (order_index, spec) in questions.into_iter().enumerate() {
            let question = Question {
                id: uuid::Uuid::new_v4().to_string(),
                project_id: project.id.clone(),
                section: spec.section,
                question_text: spec.text,
                order_index: order_index as u32,
            };
            self.store.insert_question(&question)?;

            self.store.insert_answer(&Answer {
                id: uuid::Uuid::new_v4().to_string(),
                question_id: question.id.clone(),
                ai_answer: String::new(),
                variant_a: None,
                variant_b: None,
                manual_answer: None,
                citations: Vec::new(),
                confidence: 0.0,
                answerability: Answerability::Unknown,
                status: AnswerStatus::Pending,
                created_at: Utc::now(),
            })?;
        }

        tracing::info!("Created project {} ('{}')", project.id, project.name);
        Ok(project)
    }

    pub fn get_project(&self, project_id: &str) -> AppResult<Project> {
        self.store.get_project(project_id)
    }

    pub fn list_projects(&self) -> AppResult<Vec<Project>> {
        self.store.list_projects()
    }

    pub fn delete_project(&self, project_id: &str) -> AppResult<()> {
        self.store.get_project(project_id)?;
        self.store.delete_project(project_id)
    }

    pub fn list_questions(&self, project_id: &str) -> AppResult<Vec<Question>> {
        self.store.get_project(project_id)?;
        self.store.list_questions(project_id)
    }

    pub fn get_answer(&self, answer_id: &str) -> AppResult<Answer> {
        self.store.get_answer(answer_id)
    }

    pub fn get_answer_for_question(&self, question_id: &str) -> AppResult<Answer> {
        self.store.get_answer_for_question(question_id)
    }

    // ----- generation -----

    /// Generate (or regenerate) the answer for one question.
    ///
    /// At most one generation runs per question; a concurrent second
    /// request is a conflict. On failure the answer record is untouched.
    pub async fn generate_answer(&self, question_id: &str) -> AppResult<Answer> {
        let question = self.store.get_question(question_id)?;
        let answer = self.store.get_answer_for_question(question_id)?;

        if answer.status.is_reviewed() && !self.config.allow_regenerate_reviewed {
            return Err(AppError::Conflict(format!(
                "Answer {} is {} and regeneration of reviewed answers is disabled",
                answer.id,
                answer.status.as_str()
            )));
        }

        let _guard = self.acquire_generation_slot(question_id)?;

        let context = self
            .retriever
            .retrieve(&question.question_text, self.config.top_k, None)
            .await?;

        let outcome = if context.is_empty() {
            tracing::warn!(
                "No context retrieved for question {}; recording unanswerable result",
                question_id
            );
            SynthesisOutcome {
                ai_answer: NO_DOCUMENTS_ANSWER.to_string(),
                variant_a: None,
                variant_b: None,
                citations: Vec::new(),
                confidence: 0.0,
                answerability: Answerability::No,
            }
        } else {
            self.pipeline
                .synthesize(&question.question_text, &context)
                .await?
        };

        // Commit: overwrite the generated fields and reset review state
        let updated = Answer {
            ai_answer: outcome.ai_answer,
            variant_a: outcome.variant_a,
            variant_b: outcome.variant_b,
            manual_answer: None,
            citations: outcome.citations,
            confidence: outcome.confidence,
            answerability: outcome.answerability,
            status: AnswerStatus::Generated,
            ..answer
        };
        self.store.update_answer_generated(&updated)?;

        self.store.get_answer(&updated.id)
    }

    fn acquire_generation_slot(&self, question_id: &str) -> AppResult<GenerationGuard<'_>> {
        let mut generating = self.generating.lock().unwrap();
        if !generating.insert(question_id.to_string()) {
            return Err(AppError::Conflict(format!(
                "Generation already in progress for question {}",
                question_id
            )));
        }
        Ok(GenerationGuard {
            generating: &self.generating,
            question_id: question_id.to_string(),
        })
    }

    /// Generate answers for every question in a project under a bounded
    /// worker pool. Per-question failures are isolated into the report;
    /// the batch call itself succeeds.
    pub async fn generate_all(&self, project_id: &str) -> AppResult<BatchReport> {
        let project = self.store.get_project(project_id)?;
        let questions = self.store.list_questions(project_id)?;
        let total = questions.len();

        let results: Vec<(String, AppResult<Answer>)> = stream::iter(questions)
            .map(|question| async move {
                let result = self.generate_answer(&question.id).await;
                (question.id, result)
            })
            .buffer_unordered(self.config.batch_pool_size)
            .collect()
            .await;

        let mut generated = 0usize;
        let mut errors = Vec::new();
        for (question_id, result) in results {
            match result {
                Ok(_) => generated += 1,
                Err(e) => errors.push(BatchError {
                    question_id,
                    message: e.to_string(),
                }),
            }
        }

        self.store
            .set_project_status(&project.id, ProjectStatus::Ready)?;

        tracing::info!(
            "Batch generation for project {}: {}/{} generated, {} error(s)",
            project_id,
            generated,
            total,
            errors.len()
        );

        Ok(BatchReport {
            project_id: project.id,
            total,
            generated,
            errors,
        })
    }

    // ----- review -----

    /// Apply a human review action to an answer.
    pub fn apply_review_action(
        &self,
        answer_id: &str,
        action: &ReviewAction,
        manual_text: Option<&str>,
    ) -> AppResult<Answer> {
        let answer = self.store.get_answer(answer_id)?;
        let next = apply_review(answer.status, action, manual_text)?;

        let manual = if next == AnswerStatus::Manual {
            manual_text.map(str::trim)
        } else {
            None
        };
        self.store.update_answer_review(answer_id, next, manual)?;

        tracing::info!(
            "Answer {} reviewed: {} -> {}",
            answer_id,
            answer.status.as_str(),
            next.as_str()
        );

        self.store.get_answer(answer_id)
    }

    // ----- status -----

    pub fn status(&self) -> AppResult<EngineStatus> {
        self.store.status_summary()
    }
}

/// SHA-256 over the concatenated page texts.
fn hash_pages(pages: &[PageText]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.text.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_pages_is_stable_and_page_sensitive() {
        let pages_a = vec![
            PageText { page: 1, text: "alpha".to_string() },
            PageText { page: 2, text: "beta".to_string() },
        ];
        let pages_b = vec![PageText { page: 1, text: "alphabeta".to_string() }];

        assert_eq!(hash_pages(&pages_a), hash_pages(&pages_a));
        // The separator keeps page boundaries out of collision range
        assert_ne!(hash_pages(&pages_a), hash_pages(&pages_b));
    }
}
