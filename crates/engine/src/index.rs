//! In-memory vector index over document chunks.
//!
//! Stores chunk vectors plus citation metadata (doc id, page, chunk order)
//! keyed by chunk id. Two search strategies sit behind one interface:
//! an exact brute-force scan and an approximate navigable small-world
//! graph. Scoped searches always scan the scoped subset exactly, so scope
//! restriction is never weakened by graph approximation.
//!
//! Mutations are all-or-nothing per document: validation happens before
//! any state change, and the change itself lands under a single write
//! lock, so concurrent searches never observe a half-indexed or
//! half-removed document. A per-document guard set serializes writers that
//! target the same document while leaving unrelated documents free to
//! proceed concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use diligence_core::{AppError, AppResult};

use crate::types::{Chunk, RetrievedChunk};

/// Search strategy for unscoped queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Brute-force cosine scan over all live chunks
    Exact,
    /// Greedy beam search over the neighbor graph
    Approximate,
}

/// Neighbors kept per node in the graph.
const MAX_NEIGHBORS: usize = 16;
/// Beam width while inserting a node.
const EF_CONSTRUCTION: usize = 100;
/// Minimum beam width while searching.
const EF_SEARCH: usize = 64;
/// Tombstone fraction that triggers compaction.
const COMPACT_RATIO: f64 = 0.5;

struct Node {
    chunk: Chunk,
    /// Insertion sequence; breaks exact score ties deterministically
    seq: u64,
    neighbors: Vec<usize>,
    deleted: bool,
}

#[derive(Default)]
struct IndexState {
    nodes: Vec<Node>,
    by_id: HashMap<String, usize>,
    by_doc: HashMap<String, Vec<usize>>,
    entry: Option<usize>,
    next_seq: u64,
    dims: Option<usize>,
    tombstones: usize,
}

/// Owned, injectable vector index with an explicit lifecycle.
pub struct VectorIndex {
    mode: SearchMode,
    state: RwLock<IndexState>,
    /// Documents currently being mutated (single writer per doc id)
    writers: Mutex<HashSet<String>>,
}

/// Releases the per-document writer slot on drop.
struct DocWriteGuard<'a> {
    writers: &'a Mutex<HashSet<String>>,
    doc_id: String,
}

impl Drop for DocWriteGuard<'_> {
    fn drop(&mut self) {
        self.writers.lock().unwrap().remove(&self.doc_id);
    }
}

impl VectorIndex {
    /// Create an empty index with the given unscoped-search mode.
    pub fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            state: RwLock::new(IndexState::default()),
            writers: Mutex::new(HashSet::new()),
        }
    }

    fn acquire_writer(&self, doc_id: &str) -> AppResult<DocWriteGuard<'_>> {
        let mut writers = self.writers.lock().unwrap();
        if !writers.insert(doc_id.to_string()) {
            return Err(AppError::Conflict(format!(
                "Document {} is already being mutated",
                doc_id
            )));
        }
        Ok(DocWriteGuard {
            writers: &self.writers,
            doc_id: doc_id.to_string(),
        })
    }

    /// Insert all chunks for a document, atomically.
    ///
    /// Validation (embedding dimensions, duplicate ids, already-indexed
    /// document) runs before any mutation; on error nothing is inserted.
    /// Inserting an already-indexed document fails; remove it first.
    pub fn index_document(&self, doc_id: &str, chunks: Vec<Chunk>) -> AppResult<()> {
        let _writer = self.acquire_writer(doc_id)?;
        let mut state = self.state.write().unwrap();

        if state.by_doc.contains_key(doc_id) {
            return Err(AppError::Indexing(format!(
                "Document {} is already indexed",
                doc_id
            )));
        }

        let mut seen_ids = HashSet::new();
        let mut batch_dims = state.dims;
        for chunk in &chunks {
            if chunk.doc_id != doc_id {
                return Err(AppError::Indexing(format!(
                    "Chunk {} belongs to document {}, not {}",
                    chunk.id, chunk.doc_id, doc_id
                )));
            }
            if chunk.embedding.is_empty() {
                return Err(AppError::Indexing(format!(
                    "Chunk {} has no embedding",
                    chunk.id
                )));
            }
            match batch_dims {
                Some(dims) if chunk.embedding.len() != dims => {
                    return Err(AppError::Indexing(format!(
                        "Chunk {} embedding has {} dimensions, index has {}",
                        chunk.id,
                        chunk.embedding.len(),
                        dims
                    )));
                }
                Some(_) => {}
                None => batch_dims = Some(chunk.embedding.len()),
            }
            if !seen_ids.insert(chunk.id.as_str()) || state.by_id.contains_key(&chunk.id) {
                return Err(AppError::Indexing(format!(
                    "Duplicate chunk id: {}",
                    chunk.id
                )));
            }
        }

        // Validation passed; from here on nothing can fail
        let count = chunks.len();
        for chunk in chunks {
            if state.dims.is_none() {
                state.dims = Some(chunk.embedding.len());
            }
            insert_node(&mut state, chunk, self.mode);
        }

        tracing::debug!("Indexed document {} ({} chunks)", doc_id, count);
        Ok(())
    }

    /// Delete all chunks of a document. Idempotent: removing an absent
    /// document is a no-op success.
    pub fn remove_document(&self, doc_id: &str) -> AppResult<()> {
        let _writer = self.acquire_writer(doc_id)?;
        let mut state = self.state.write().unwrap();

        let Some(indices) = state.by_doc.remove(doc_id) else {
            return Ok(());
        };

        for idx in indices {
            let node = &mut state.nodes[idx];
            node.deleted = true;
            let id = node.chunk.id.clone();
            state.by_id.remove(&id);
            state.tombstones += 1;
        }

        // Re-anchor the graph if the entry point died
        if let Some(entry) = state.entry {
            if state.nodes[entry].deleted {
                state.entry = state.nodes.iter().position(|n| !n.deleted);
            }
        }

        let live = state.nodes.len() - state.tombstones;
        if state.tombstones > 0 && (state.tombstones as f64) >= (live.max(1) as f64) * COMPACT_RATIO
        {
            compact(&mut state, self.mode);
        }

        tracing::debug!("Removed document {} from index", doc_id);
        Ok(())
    }

    /// Top-k most similar chunks, restricted to `scope` when given.
    ///
    /// Results are sorted by descending similarity; exact score ties break
    /// by insertion order. An empty scope means "query nothing".
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        scope: Option<&HashSet<String>>,
    ) -> Vec<RetrievedChunk> {
        if k == 0 {
            return Vec::new();
        }

        let state = self.state.read().unwrap();

        let candidates: Vec<usize> = match scope {
            Some(scope) if scope.is_empty() => return Vec::new(),
            Some(scope) => scope
                .iter()
                .filter_map(|doc_id| state.by_doc.get(doc_id))
                .flatten()
                .copied()
                .filter(|&idx| !state.nodes[idx].deleted)
                .collect(),
            None => match self.mode {
                SearchMode::Exact => (0..state.nodes.len())
                    .filter(|&idx| !state.nodes[idx].deleted)
                    .collect(),
                SearchMode::Approximate => beam_search(&state, query, EF_SEARCH.max(k)),
            },
        };

        let mut scored: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|idx| (idx, cosine_similarity(query, &state.nodes[idx].chunk.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| state.nodes[a.0].seq.cmp(&state.nodes[b.0].seq))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(idx, score)| RetrievedChunk {
                chunk: state.nodes[idx].chunk.clone(),
                score,
            })
            .collect()
    }

    /// Whether the document has any indexed chunks.
    pub fn contains_document(&self, doc_id: &str) -> bool {
        self.state.read().unwrap().by_doc.contains_key(doc_id)
    }

    /// Number of live chunks in the index.
    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap();
        state.nodes.len() - state.tombstones
    }

    /// Whether the index holds no live chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Insert a chunk as a graph node, wiring neighbors in approximate mode.
fn insert_node(state: &mut IndexState, chunk: Chunk, mode: SearchMode) {
    let idx = state.nodes.len();
    let seq = state.next_seq;
    state.next_seq += 1;

    let neighbors = if mode == SearchMode::Approximate && state.entry.is_some() {
        let mut nearest = beam_search(state, &chunk.embedding, EF_CONSTRUCTION);
        nearest.truncate(MAX_NEIGHBORS);
        nearest
    } else {
        Vec::new()
    };

    state.by_id.insert(chunk.id.clone(), idx);
    state
        .by_doc
        .entry(chunk.doc_id.clone())
        .or_default()
        .push(idx);

    state.nodes.push(Node {
        chunk,
        seq,
        neighbors: neighbors.clone(),
        deleted: false,
    });

    // Bidirectional edges, pruned back to the closest MAX_NEIGHBORS
    for neighbor_idx in neighbors {
        state.nodes[neighbor_idx].neighbors.push(idx);
        if state.nodes[neighbor_idx].neighbors.len() > MAX_NEIGHBORS {
            let anchor = state.nodes[neighbor_idx].chunk.embedding.clone();
            let mut links = std::mem::take(&mut state.nodes[neighbor_idx].neighbors);
            links.sort_by(|&a, &b| {
                let sim_a = cosine_similarity(&anchor, &state.nodes[a].chunk.embedding);
                let sim_b = cosine_similarity(&anchor, &state.nodes[b].chunk.embedding);
                sim_b.partial_cmp(&sim_a).unwrap_or(std::cmp::Ordering::Equal)
            });
            links.truncate(MAX_NEIGHBORS);
            state.nodes[neighbor_idx].neighbors = links;
        }
    }

    if state.entry.is_none() {
        state.entry = Some(idx);
    }
}

/// Greedy beam search over the neighbor graph.
///
/// Returns up to `ef` live node indices ordered by descending similarity.
fn beam_search(state: &IndexState, query: &[f32], ef: usize) -> Vec<usize> {
    let Some(entry) = state.entry else {
        return Vec::new();
    };

    let mut visited: HashSet<usize> = HashSet::new();
    let mut frontier: Vec<usize> = vec![entry];
    visited.insert(entry);

    let mut best: Vec<(usize, f32)> = Vec::new();
    if !state.nodes[entry].deleted {
        best.push((entry, cosine_similarity(query, &state.nodes[entry].chunk.embedding)));
    }

    while let Some(current) = frontier.pop() {
        for &neighbor in &state.nodes[current].neighbors {
            if !visited.insert(neighbor) {
                continue;
            }

            let score = cosine_similarity(query, &state.nodes[neighbor].chunk.embedding);
            let worst = best.last().map(|(_, s)| *s).unwrap_or(f32::NEG_INFINITY);

            if best.len() < ef || score > worst {
                frontier.push(neighbor);
                if !state.nodes[neighbor].deleted {
                    best.push((neighbor, score));
                    best.sort_by(|a, b| {
                        b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                    });
                    best.truncate(ef);
                }
            }
        }
    }

    best.into_iter().map(|(idx, _)| idx).collect()
}

/// Rebuild the index without tombstoned nodes.
fn compact(state: &mut IndexState, mode: SearchMode) {
    let old = std::mem::take(state);
    state.next_seq = old.next_seq;
    state.dims = old.dims;

    let mut live: Vec<Node> = old.nodes.into_iter().filter(|n| !n.deleted).collect();
    // Re-insert in original insertion order so tie-breaking survives rebuilds
    live.sort_by_key(|n| n.seq);

    for node in live {
        let seq = node.seq;
        insert_node(state, node.chunk, mode);
        let idx = state.nodes.len() - 1;
        state.nodes[idx].seq = seq;
    }

    tracing::debug!("Compacted index to {} live chunks", state.nodes.len());
}

/// Calculate cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc_id: &str, index: u32, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: format!("{}_c{}", doc_id, index),
            doc_id: doc_id.to_string(),
            doc_name: format!("{}.pdf", doc_id),
            page: 1,
            chunk_index: index,
            text: format!("chunk {} of {}", index, doc_id),
            embedding,
        }
    }

    fn scope(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document(
                "d1",
                vec![
                    chunk("d1", 0, vec![1.0, 0.0, 0.0]),
                    chunk("d1", 1, vec![0.0, 1.0, 0.0]),
                ],
            )
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 5, None);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "d1_c0");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_results_sorted_non_increasing() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document(
                "d1",
                vec![
                    chunk("d1", 0, vec![1.0, 0.0, 0.0]),
                    chunk("d1", 1, vec![0.9, 0.1, 0.0]),
                    chunk("d1", 2, vec![0.0, 1.0, 0.0]),
                    chunk("d1", 3, vec![0.5, 0.5, 0.0]),
                ],
            )
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 10, None);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_exact_ties_break_by_insertion_order() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document("d1", vec![chunk("d1", 0, vec![1.0, 0.0])])
            .unwrap();
        index
            .index_document("d2", vec![chunk("d2", 0, vec![1.0, 0.0])])
            .unwrap();
        index
            .index_document("d3", vec![chunk("d3", 0, vec![1.0, 0.0])])
            .unwrap();

        let results = index.search(&[1.0, 0.0], 3, None);
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["d1_c0", "d2_c0", "d3_c0"]);
    }

    #[test]
    fn test_scope_restricts_results() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document("d1", vec![chunk("d1", 0, vec![1.0, 0.0])])
            .unwrap();
        index
            .index_document("d2", vec![chunk("d2", 0, vec![1.0, 0.0])])
            .unwrap();

        let results = index.search(&[1.0, 0.0], 10, Some(&scope(&["d2"])));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.doc_id, "d2");
    }

    #[test]
    fn test_empty_scope_returns_nothing() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document("d1", vec![chunk("d1", 0, vec![1.0, 0.0])])
            .unwrap();

        let results = index.search(&[1.0, 0.0], 10, Some(&scope(&[])));
        assert!(results.is_empty());
    }

    #[test]
    fn test_remove_document_is_idempotent() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document("d1", vec![chunk("d1", 0, vec![1.0, 0.0])])
            .unwrap();

        index.remove_document("d1").unwrap();
        index.remove_document("d1").unwrap();
        index.remove_document("never-indexed").unwrap();

        assert!(index.is_empty());
    }

    #[test]
    fn test_removed_document_absent_from_scoped_search() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document("d1", vec![chunk("d1", 0, vec![1.0, 0.0])])
            .unwrap();
        index
            .index_document("d2", vec![chunk("d2", 0, vec![1.0, 0.0])])
            .unwrap();

        index.remove_document("d1").unwrap();

        let results = index.search(&[1.0, 0.0], 10, Some(&scope(&["d1", "d2"])));
        assert!(results.iter().all(|r| r.chunk.doc_id != "d1"));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rolls_back() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document("d1", vec![chunk("d1", 0, vec![1.0, 0.0, 0.0])])
            .unwrap();

        let result = index.index_document(
            "d2",
            vec![
                chunk("d2", 0, vec![1.0, 0.0, 0.0]),
                chunk("d2", 1, vec![1.0, 0.0]), // wrong dims
            ],
        );

        assert!(matches!(result, Err(AppError::Indexing(_))));
        // Nothing of d2 was inserted
        assert!(!index.contains_document("d2"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_duplicate_document_rejected() {
        let index = VectorIndex::new(SearchMode::Exact);
        index
            .index_document("d1", vec![chunk("d1", 0, vec![1.0, 0.0])])
            .unwrap();

        let result = index.index_document("d1", vec![chunk("d1", 1, vec![0.0, 1.0])]);
        assert!(matches!(result, Err(AppError::Indexing(_))));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_approximate_mode_finds_nearest() {
        let index = VectorIndex::new(SearchMode::Approximate);

        // A spread of unit vectors in 4 dims
        for doc in 0..10 {
            let angle = doc as f32 * 0.3;
            index
                .index_document(
                    &format!("d{}", doc),
                    vec![chunk(
                        &format!("d{}", doc),
                        0,
                        vec![angle.cos(), angle.sin(), 0.0, 0.0],
                    )],
                )
                .unwrap();
        }

        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 3, None);
        assert_eq!(results.len(), 3);
        // d0 (angle 0) is the exact direction of the query
        assert_eq!(results[0].chunk.doc_id, "d0");
    }

    #[test]
    fn test_compaction_preserves_search() {
        let index = VectorIndex::new(SearchMode::Approximate);
        for doc in 0..6 {
            let angle = doc as f32 * 0.5;
            index
                .index_document(
                    &format!("d{}", doc),
                    vec![chunk(&format!("d{}", doc), 0, vec![angle.cos(), angle.sin()])],
                )
                .unwrap();
        }

        // Remove enough documents to trigger compaction
        for doc in 0..4 {
            index.remove_document(&format!("d{}", doc)).unwrap();
        }

        assert_eq!(index.len(), 2);
        let results = index.search(&[1.0, 0.0], 10, None);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.chunk.doc_id == "d4" || r.chunk.doc_id == "d5"));
    }

    #[test]
    fn test_metadata_survives_round_trip() {
        let index = VectorIndex::new(SearchMode::Exact);
        let mut c = chunk("d1", 3, vec![0.0, 1.0]);
        c.page = 7;
        c.doc_name = "annual-report.pdf".to_string();
        index.index_document("d1", vec![c]).unwrap();

        let results = index.search(&[0.0, 1.0], 1, None);
        assert_eq!(results[0].chunk.page, 7);
        assert_eq!(results[0].chunk.doc_name, "annual-report.pdf");
        assert_eq!(results[0].chunk.chunk_index, 3);
    }
}
