//! Page-aware text chunking with configurable window size and overlap.
//!
//! Pages are concatenated with cumulative character offsets so each
//! emitted chunk knows which page its window starts on. Character-based
//! sizing; all slicing respects UTF-8 boundaries because the window walks
//! a char vector, never raw bytes.

use diligence_core::{AppError, AppResult};

use crate::types::{ChunkDraft, PageText};

/// Sliding-window chunker.
#[derive(Debug, Clone)]
pub struct Chunker {
    window: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker; `overlap` must be smaller than `window`.
    pub fn new(window: usize, overlap: usize) -> AppResult<Self> {
        if window == 0 {
            return Err(AppError::Validation(
                "Chunk window must be positive".to_string(),
            ));
        }
        if overlap >= window {
            return Err(AppError::Validation(format!(
                "Chunk overlap ({}) must be smaller than the window ({})",
                overlap, window
            )));
        }

        Ok(Self { window, overlap })
    }

    /// Chunk a document's pages into overlapping windows.
    ///
    /// Returns a lazy iterator over [`ChunkDraft`]s. Empty pages contribute
    /// no text (the caller still counts them in `page_count`). Text shorter
    /// than the window yields exactly one chunk; trailing text shorter than
    /// the window is never dropped. Deterministic for identical input and
    /// configuration.
    pub fn chunk_pages(&self, doc_id: &str, doc_name: &str, pages: &[PageText]) -> ChunkIter {
        let mut text = Vec::new();
        let mut page_starts = Vec::new();

        for page in pages {
            if page.text.is_empty() {
                continue;
            }
            page_starts.push((text.len(), page.page));
            text.extend(page.text.chars());
        }

        tracing::debug!(
            "Chunking '{}': {} chars over {} non-empty pages (window {}, overlap {})",
            doc_name,
            text.len(),
            page_starts.len(),
            self.window,
            self.overlap
        );

        ChunkIter {
            doc_id: doc_id.to_string(),
            doc_name: doc_name.to_string(),
            text,
            page_starts,
            window: self.window,
            step: self.window - self.overlap,
            pos: 0,
            chunk_index: 0,
            done: false,
        }
    }
}

/// Lazy iterator over a document's chunk windows.
pub struct ChunkIter {
    doc_id: String,
    doc_name: String,
    text: Vec<char>,
    /// (starting char offset, page number) per non-empty page, ascending
    page_starts: Vec<(usize, u32)>,
    window: usize,
    step: usize,
    pos: usize,
    chunk_index: u32,
    done: bool,
}

impl ChunkIter {
    /// Page containing the given character offset.
    fn page_at(&self, offset: usize) -> u32 {
        let idx = self.page_starts.partition_point(|(start, _)| *start <= offset);
        if idx == 0 {
            // No non-empty pages; callers never reach this with text present
            return 1;
        }
        self.page_starts[idx - 1].1
    }
}

impl Iterator for ChunkIter {
    type Item = ChunkDraft;

    fn next(&mut self) -> Option<ChunkDraft> {
        if self.done || self.text.is_empty() {
            return None;
        }

        let end = (self.pos + self.window).min(self.text.len());
        let chunk_text: String = self.text[self.pos..end].iter().collect();

        let draft = ChunkDraft {
            id: format!("{}_c{}", self.doc_id, self.chunk_index),
            doc_id: self.doc_id.clone(),
            doc_name: self.doc_name.clone(),
            page: self.page_at(self.pos),
            chunk_index: self.chunk_index,
            text: chunk_text,
        };

        if end >= self.text.len() {
            self.done = true;
        } else {
            self.pos += self.step;
        }
        self.chunk_index += 1;

        Some(draft)
    }
}
