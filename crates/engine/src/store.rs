//! SQLite-backed relational store.
//!
//! Durable home for documents, projects, questions, and answers, plus the
//! chunk rows (text + embedding BLOBs) the in-memory vector index is
//! rebuilt from at startup. The store owns durability; the engine owns
//! semantics.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use diligence_core::{AppError, AppResult};
use rusqlite::{params, Connection};

use crate::types::{
    Answer, AnswerStatus, Answerability, Chunk, Document, DocumentStatus, EngineStatus, Project,
    ProjectStatus, Question,
};

/// Relational store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Store(format!("Failed to create store directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Store(format!("Failed to open SQLite store: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory store (tests and throwaway runs).
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Store(format!("Failed to open in-memory store: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                page_count INTEGER NOT NULL DEFAULT 0,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                indexed_at TEXT,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                doc_name TEXT NOT NULL,
                page INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                FOREIGN KEY (doc_id) REFERENCES documents(id)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id);

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS questions (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                section TEXT NOT NULL DEFAULT 'General',
                question_text TEXT NOT NULL,
                order_index INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (project_id) REFERENCES projects(id)
            );

            CREATE INDEX IF NOT EXISTS idx_questions_project ON questions(project_id);

            CREATE TABLE IF NOT EXISTS answers (
                id TEXT PRIMARY KEY,
                question_id TEXT NOT NULL UNIQUE,
                ai_answer TEXT NOT NULL DEFAULT '',
                variant_a TEXT,
                variant_b TEXT,
                manual_answer TEXT,
                citations TEXT NOT NULL DEFAULT '[]',
                confidence REAL NOT NULL DEFAULT 0.0,
                answerability TEXT NOT NULL DEFAULT 'unknown',
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (question_id) REFERENCES questions(id)
            );
            "#,
        )
        .map_err(|e| AppError::Store(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ----- documents -----

    pub fn insert_document(&self, doc: &Document) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO documents (id, name, status, page_count, chunk_count, error_message, indexed_at, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                doc.id,
                doc.name,
                doc.status.as_str(),
                doc.page_count as i64,
                doc.chunk_count as i64,
                doc.error_message,
                doc.indexed_at.map(|t| t.to_rfc3339()),
                doc.content_hash,
                doc.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Store(format!("Failed to insert document: {}", e)))?;

        Ok(())
    }

    pub fn get_document(&self, id: &str) -> AppResult<Document> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, status, page_count, chunk_count, error_message, indexed_at, content_hash, created_at
             FROM documents WHERE id = ?1",
            params![id],
            row_to_document,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound(format!("Document {}", id))
            }
            other => AppError::Store(format!("Failed to fetch document: {}", other)),
        })
    }

    pub fn list_documents(&self) -> AppResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, status, page_count, chunk_count, error_message, indexed_at, content_hash, created_at
                 FROM documents ORDER BY created_at",
            )
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_document)
            .map_err(|e| AppError::Store(format!("Failed to list documents: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read document row: {}", e)))
    }

    pub fn find_document_by_hash(&self, content_hash: &str) -> AppResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT id, name, status, page_count, chunk_count, error_message, indexed_at, content_hash, created_at
             FROM documents WHERE content_hash = ?1 AND status = 'INDEXED' LIMIT 1",
            params![content_hash],
            row_to_document,
        );

        match result {
            Ok(doc) => Ok(Some(doc)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Store(format!("Failed to query by hash: {}", e))),
        }
    }

    pub fn mark_document_failed(&self, id: &str, message: &str) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE documents SET status = 'FAILED', error_message = ?2 WHERE id = ?1",
            params![id, message],
        )
        .map_err(|e| AppError::Store(format!("Failed to mark document failed: {}", e)))?;
        Ok(())
    }

    /// Persist a document's chunks and flip it to INDEXED in one
    /// transaction; a failure leaves the document with zero stored chunks.
    pub fn commit_indexed_document(
        &self,
        doc_id: &str,
        chunks: &[Chunk],
        indexed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Store(format!("Failed to begin transaction: {}", e)))?;

        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks (id, doc_id, doc_name, page, chunk_index, text, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    chunk.id,
                    chunk.doc_id,
                    chunk.doc_name,
                    chunk.page as i64,
                    chunk.chunk_index as i64,
                    chunk.text,
                    embedding_to_bytes(&chunk.embedding),
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to insert chunk: {}", e)))?;
        }

        tx.execute(
            "UPDATE documents SET status = 'INDEXED', chunk_count = ?2, indexed_at = ?3, error_message = NULL
             WHERE id = ?1",
            params![doc_id, chunks.len() as i64, indexed_at.to_rfc3339()],
        )
        .map_err(|e| AppError::Store(format!("Failed to finalize document: {}", e)))?;

        tx.commit()
            .map_err(|e| AppError::Store(format!("Failed to commit indexing: {}", e)))
    }

    /// Delete a document and its chunks.
    pub fn delete_document(&self, id: &str) -> AppResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Store(format!("Failed to begin transaction: {}", e)))?;

        tx.execute("DELETE FROM chunks WHERE doc_id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("Failed to delete chunks: {}", e)))?;
        tx.execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("Failed to delete document: {}", e)))?;

        tx.commit()
            .map_err(|e| AppError::Store(format!("Failed to commit delete: {}", e)))
    }

    /// Load every stored chunk, for rebuilding the vector index at startup.
    pub fn load_all_chunks(&self) -> AppResult<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, doc_id, doc_name, page, chunk_index, text, embedding
                 FROM chunks ORDER BY doc_id, chunk_index",
            )
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let embedding_bytes: Vec<u8> = row.get(6)?;
                Ok(Chunk {
                    id: row.get(0)?,
                    doc_id: row.get(1)?,
                    doc_name: row.get(2)?,
                    page: row.get::<_, i64>(3)? as u32,
                    chunk_index: row.get::<_, i64>(4)? as u32,
                    text: row.get(5)?,
                    embedding: bytes_to_embedding(&embedding_bytes),
                })
            })
            .map_err(|e| AppError::Store(format!("Failed to load chunks: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read chunk row: {}", e)))
    }

    // ----- projects -----

    pub fn insert_project(&self, project: &Project) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO projects (id, name, description, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.name,
                project.description,
                project.status.as_str(),
                project.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Store(format!("Failed to insert project: {}", e)))?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> AppResult<Project> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, description, status, created_at FROM projects WHERE id = ?1",
            params![id],
            row_to_project,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Project {}", id)),
            other => AppError::Store(format!("Failed to fetch project: {}", other)),
        })
    }

    pub fn list_projects(&self) -> AppResult<Vec<Project>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, description, status, created_at FROM projects ORDER BY created_at")
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_project)
            .map_err(|e| AppError::Store(format!("Failed to list projects: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read project row: {}", e)))
    }

    pub fn set_project_status(&self, id: &str, status: ProjectStatus) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE projects SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )
        .map_err(|e| AppError::Store(format!("Failed to update project status: {}", e)))?;
        Ok(())
    }

    /// Delete a project with its questions and answers.
    pub fn delete_project(&self, id: &str) -> AppResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Store(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM answers WHERE question_id IN (SELECT id FROM questions WHERE project_id = ?1)",
            params![id],
        )
        .map_err(|e| AppError::Store(format!("Failed to delete answers: {}", e)))?;
        tx.execute("DELETE FROM questions WHERE project_id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("Failed to delete questions: {}", e)))?;
        tx.execute("DELETE FROM projects WHERE id = ?1", params![id])
            .map_err(|e| AppError::Store(format!("Failed to delete project: {}", e)))?;

        tx.commit()
            .map_err(|e| AppError::Store(format!("Failed to commit delete: {}", e)))
    }

    // ----- questions -----

    pub fn insert_question(&self, question: &Question) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO questions (id, project_id, section, question_text, order_index)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                question.id,
                question.project_id,
                question.section,
                question.question_text,
                question.order_index as i64,
            ],
        )
        .map_err(|e| AppError::Store(format!("Failed to insert question: {}", e)))?;
        Ok(())
    }

    pub fn get_question(&self, id: &str) -> AppResult<Question> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, project_id, section, question_text, order_index FROM questions WHERE id = ?1",
            params![id],
            row_to_question,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Question {}", id)),
            other => AppError::Store(format!("Failed to fetch question: {}", other)),
        })
    }

    pub fn list_questions(&self, project_id: &str) -> AppResult<Vec<Question>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, project_id, section, question_text, order_index
                 FROM questions WHERE project_id = ?1 ORDER BY order_index",
            )
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![project_id], row_to_question)
            .map_err(|e| AppError::Store(format!("Failed to list questions: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read question row: {}", e)))
    }

    // ----- answers -----

    pub fn insert_answer(&self, answer: &Answer) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO answers (id, question_id, ai_answer, variant_a, variant_b, manual_answer, citations, confidence, answerability, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                answer.id,
                answer.question_id,
                answer.ai_answer,
                answer.variant_a,
                answer.variant_b,
                answer.manual_answer,
                serde_json::to_string(&answer.citations)?,
                answer.confidence as f64,
                answer.answerability.as_str(),
                answer.status.as_str(),
                answer.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Store(format!("Failed to insert answer: {}", e)))?;
        Ok(())
    }

    pub fn get_answer(&self, id: &str) -> AppResult<Answer> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, question_id, ai_answer, variant_a, variant_b, manual_answer, citations, confidence, answerability, status, created_at
             FROM answers WHERE id = ?1",
            params![id],
            row_to_answer,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("Answer {}", id)),
            other => AppError::Store(format!("Failed to fetch answer: {}", other)),
        })
    }

    pub fn get_answer_for_question(&self, question_id: &str) -> AppResult<Answer> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, question_id, ai_answer, variant_a, variant_b, manual_answer, citations, confidence, answerability, status, created_at
             FROM answers WHERE question_id = ?1",
            params![question_id],
            row_to_answer,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                AppError::NotFound(format!("Answer for question {}", question_id))
            }
            other => AppError::Store(format!("Failed to fetch answer: {}", other)),
        })
    }

    /// Overwrite the generated fields of an answer and reset its status.
    pub fn update_answer_generated(&self, answer: &Answer) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE answers SET ai_answer = ?2, variant_a = ?3, variant_b = ?4, citations = ?5,
                 confidence = ?6, answerability = ?7, status = ?8, manual_answer = NULL
                 WHERE id = ?1",
                params![
                    answer.id,
                    answer.ai_answer,
                    answer.variant_a,
                    answer.variant_b,
                    serde_json::to_string(&answer.citations)?,
                    answer.confidence as f64,
                    answer.answerability.as_str(),
                    answer.status.as_str(),
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to update answer: {}", e)))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("Answer {}", answer.id)));
        }
        Ok(())
    }

    /// Record a review decision.
    pub fn update_answer_review(
        &self,
        id: &str,
        status: AnswerStatus,
        manual_answer: Option<&str>,
    ) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE answers SET status = ?2, manual_answer = COALESCE(?3, manual_answer) WHERE id = ?1",
                params![id, status.as_str(), manual_answer],
            )
            .map_err(|e| AppError::Store(format!("Failed to update review: {}", e)))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("Answer {}", id)));
        }
        Ok(())
    }

    // ----- summary -----

    pub fn status_summary(&self) -> AppResult<EngineStatus> {
        let conn = self.conn.lock().unwrap();

        let count = |sql: &str| -> AppResult<usize> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|v| v as usize)
                .map_err(|e| AppError::Store(format!("Failed to count: {}", e)))
        };

        Ok(EngineStatus {
            documents: count("SELECT COUNT(*) FROM documents")?,
            indexed_documents: count("SELECT COUNT(*) FROM documents WHERE status = 'INDEXED'")?,
            chunks: count("SELECT COUNT(*) FROM chunks")?,
            projects: count("SELECT COUNT(*) FROM projects")?,
            questions: count("SELECT COUNT(*) FROM questions")?,
            answered: count("SELECT COUNT(*) FROM answers WHERE status != 'PENDING'")?,
        })
    }

}

// ----- row mappers -----

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn row_to_document(row: &rusqlite::Row<'_>) -> Result<Document, rusqlite::Error> {
    let status: String = row.get(2)?;
    let indexed_at: Option<String> = row.get(6)?;

    Ok(Document {
        id: row.get(0)?,
        name: row.get(1)?,
        status: DocumentStatus::parse(&status)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        page_count: row.get::<_, i64>(3)? as u32,
        chunk_count: row.get::<_, i64>(4)? as u32,
        error_message: row.get(5)?,
        indexed_at: indexed_at.map(parse_timestamp).transpose()?,
        content_hash: row.get(7)?,
        created_at: parse_timestamp(row.get(8)?)?,
    })
}

fn row_to_project(row: &rusqlite::Row<'_>) -> Result<Project, rusqlite::Error> {
    let status: String = row.get(3)?;

    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: ProjectStatus::parse(&status)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        created_at: parse_timestamp(row.get(4)?)?,
    })
}

fn row_to_question(row: &rusqlite::Row<'_>) -> Result<Question, rusqlite::Error> {
    Ok(Question {
        id: row.get(0)?,
        project_id: row.get(1)?,
        section: row.get(2)?,
        question_text: row.get(3)?,
        order_index: row.get::<_, i64>(4)? as u32,
    })
}

fn row_to_answer(row: &rusqlite::Row<'_>) -> Result<Answer, rusqlite::Error> {
    let citations_json: String = row.get(6)?;
    let answerability: String = row.get(8)?;
    let status: String = row.get(9)?;

    Ok(Answer {
        id: row.get(0)?,
        question_id: row.get(1)?,
        ai_answer: row.get(2)?,
        variant_a: row.get(3)?,
        variant_b: row.get(4)?,
        manual_answer: row.get(5)?,
        citations: serde_json::from_str(&citations_json)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        confidence: row.get::<_, f64>(7)? as f32,
        answerability: Answerability::parse(&answerability),
        status: AnswerStatus::parse(&status)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        created_at: parse_timestamp(row.get(10)?)?,
    })
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    let mut embedding = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        embedding.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    embedding
}
