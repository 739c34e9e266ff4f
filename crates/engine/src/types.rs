//! Engine type definitions.

use chrono::{DateTime, Utc};
use diligence_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// One page of extracted document text, as delivered by the upstream
/// document parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number
    pub page: u32,

    /// Extracted text for the page (may be empty)
    pub text: String,
}

/// A chunk emitted by the chunker, before embedding.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    /// Unique chunk identifier (`<doc_id>_c<chunk_index>`)
    pub id: String,

    /// Owning document id
    pub doc_id: String,

    /// Owning document name (carried for citation rendering)
    pub doc_name: String,

    /// 1-based page containing the chunk's starting offset
    pub page: u32,

    /// 0-based order within the document
    pub chunk_index: u32,

    /// Chunk text
    pub text: String,
}

/// An embedded chunk, the unit the vector index stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier
    pub id: String,

    /// Owning document id
    pub doc_id: String,

    /// Owning document name
    pub doc_name: String,

    /// 1-based page number
    pub page: u32,

    /// 0-based order within the document
    pub chunk_index: u32,

    /// Chunk text
    pub text: String,

    /// Embedding vector
    pub embedding: Vec<f32>,
}

impl ChunkDraft {
    /// Attach an embedding, producing the indexable chunk.
    pub fn with_embedding(self, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: self.id,
            doc_id: self.doc_id,
            doc_name: self.doc_name,
            page: self.page,
            chunk_index: self.chunk_index,
            text: self.text,
            embedding,
        }
    }
}

/// A chunk returned from retrieval, enriched with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,

    /// Cosine similarity against the query embedding
    pub score: f32,
}

/// Document indexing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Pending,
    Indexing,
    Indexed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Indexing => "INDEXING",
            Self::Indexed => "INDEXED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "INDEXING" => Ok(Self::Indexing),
            "INDEXED" => Ok(Self::Indexed),
            "FAILED" => Ok(Self::Failed),
            other => Err(AppError::Store(format!("Unknown document status: {}", other))),
        }
    }
}

/// A source document; the unit of atomic indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub status: DocumentStatus,
    pub page_count: u32,
    pub chunk_count: u32,
    pub error_message: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,

    /// SHA-256 over the concatenated page texts
    pub content_hash: String,

    pub created_at: DateTime<Utc>,
}

/// Project lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    Draft,
    Ready,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Ready => "READY",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "READY" => Ok(Self::Ready),
            other => Err(AppError::Store(format!("Unknown project status: {}", other))),
        }
    }
}

/// A questionnaire project owning an ordered set of questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

/// A questionnaire question; immutable after project creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub project_id: String,
    pub section: String,
    pub question_text: String,
    pub order_index: u32,
}

/// Section/text pair used when creating a project's questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub section: String,
    pub text: String,
}

/// Answer review lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerStatus {
    Pending,
    Generated,
    Confirmed,
    Rejected,
    Manual,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Generated => "GENERATED",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
            Self::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "GENERATED" => Ok(Self::Generated),
            "CONFIRMED" => Ok(Self::Confirmed),
            "REJECTED" => Ok(Self::Rejected),
            "MANUAL" => Ok(Self::Manual),
            other => Err(AppError::Store(format!("Unknown answer status: {}", other))),
        }
    }

    /// Whether a human review decision has been recorded.
    pub fn is_reviewed(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected | Self::Manual)
    }
}

/// Whether the model judged the context sufficient to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Answerability {
    Yes,
    Partial,
    No,
    Unknown,
}

impl Answerability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::Partial => "partial",
            Self::No => "no",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "yes" => Self::Yes,
            "partial" => Self::Partial,
            "no" => Self::No,
            _ => Self::Unknown,
        }
    }
}

/// A pointer from an answer claim back to a retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based sequence within the answer, contiguous, assigned at merge
    pub num: u32,

    pub doc_id: String,
    pub doc_name: String,
    pub page: u32,

    /// Quoted snippet from the cited chunk
    pub text: String,

    pub chunk_id: String,
}

/// An answer record owned by a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub question_id: String,

    /// Consolidated answer produced by the merge step
    pub ai_answer: String,

    /// Raw candidate texts, kept for comparison
    pub variant_a: Option<String>,
    pub variant_b: Option<String>,

    /// Human override text (MANUAL status)
    pub manual_answer: Option<String>,

    pub citations: Vec<Citation>,

    /// Self-assessed support in [0, 1]
    pub confidence: f32,

    pub answerability: Answerability,
    pub status: AnswerStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-question failure in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    pub question_id: String,
    pub message: String,
}

/// Outcome of generating a whole project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub project_id: String,
    pub total: usize,
    pub generated: usize,
    pub errors: Vec<BatchError>,
}

/// Engine-wide counters for the status command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub documents: usize,
    pub indexed_documents: usize,
    pub chunks: usize,
    pub projects: usize,
    pub questions: usize,
    pub answered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            AnswerStatus::Pending,
            AnswerStatus::Generated,
            AnswerStatus::Confirmed,
            AnswerStatus::Rejected,
            AnswerStatus::Manual,
        ] {
            assert_eq!(AnswerStatus::parse(status.as_str()).unwrap(), status);
        }

        assert!(AnswerStatus::parse("BOGUS").is_err());
    }

    #[test]
    fn test_is_reviewed() {
        assert!(!AnswerStatus::Pending.is_reviewed());
        assert!(!AnswerStatus::Generated.is_reviewed());
        assert!(AnswerStatus::Confirmed.is_reviewed());
        assert!(AnswerStatus::Rejected.is_reviewed());
        assert!(AnswerStatus::Manual.is_reviewed());
    }

    #[test]
    fn test_answerability_parse_is_lenient() {
        assert_eq!(Answerability::parse("Yes"), Answerability::Yes);
        assert_eq!(Answerability::parse(" partial "), Answerability::Partial);
        assert_eq!(Answerability::parse("no"), Answerability::No);
        assert_eq!(Answerability::parse("maybe"), Answerability::Unknown);
    }

    #[test]
    fn test_document_status_round_trip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Indexing,
            DocumentStatus::Indexed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()).unwrap(), status);
        }
    }
}
