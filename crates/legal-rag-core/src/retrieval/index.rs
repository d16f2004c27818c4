//! Vector index (component B): embedding-backed passage store supporting
//! per-collection filtered search. An HNSW index is built per collection,
//! at a 1024-dim embedding width, with a linear cosine-similarity fallback
//! and a stable `chunk_index`-ascending tie-break.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(feature = "ann")]
use hora::core::ann_index::ANNIndex;
#[cfg(feature = "ann")]
use hora::index::hnsw_idx::HNSWIndex;
#[cfg(feature = "ann")]
use hora::index::hnsw_params::HNSWParams;

use crate::corpus::{schema::EMBEDDING_DIM, Chunk};
use crate::errors::{RetrievalError, Result};
use crate::retrieval::similarity::cosine_similarity;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filters {
    pub exact_title: Vec<String>,
    pub doc_id: Vec<String>,
    pub agency: Vec<String>,
}

impl Filters {
    /// An empty or all-unknown filter map degrades to unfiltered search.
    pub fn is_effectively_empty(&self) -> bool {
        self.exact_title.is_empty() && self.doc_id.is_empty() && self.agency.is_empty()
    }

    /// Parse a raw key/value map, silently dropping unrecognized keys.
    pub fn from_raw(raw: &HashMap<String, Vec<String>>) -> Self {
        let mut f = Filters::default();
        for (key, values) in raw {
            match key.as_str() {
                "exact_title" => f.exact_title = values.clone(),
                "doc_id" => f.doc_id = values.clone(),
                "agency" => f.agency = values.clone(),
                other => debug!(key = other, "ignoring unrecognized filter key"),
            }
        }
        f
    }
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

struct CollectionIndex {
    chunks: Vec<Chunk>,
    /// doc_id -> document title, used to resolve the `exact_title` filter
    /// against chunks, which carry no title of their own.
    doc_titles: HashMap<String, String>,
    #[cfg(feature = "ann")]
    ann: Option<HNSWIndex<f32, i64>>,
}

impl CollectionIndex {
    fn new(chunks: Vec<Chunk>, doc_titles: HashMap<String, String>) -> Self {
        #[cfg(feature = "ann")]
        let ann = Self::build_ann(&chunks);

        Self {
            chunks,
            doc_titles,
            #[cfg(feature = "ann")]
            ann,
        }
    }

    #[cfg(feature = "ann")]
    fn build_ann(chunks: &[Chunk]) -> Option<HNSWIndex<f32, i64>> {
        if chunks.is_empty() {
            return None;
        }
        let params = HNSWParams {
            n_neighbor: 16,
            ef_build: 100,
            ef_search: 50,
            ..Default::default()
        };
        let mut index = HNSWIndex::<f32, i64>::new(EMBEDDING_DIM, &params);
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.embedding.len() != EMBEDDING_DIM {
                warn!(
                    doc_id = %chunk.doc_id,
                    chunk_index = chunk.chunk_index,
                    "skipping chunk with unexpected embedding width from ANN index"
                );
                continue;
            }
            let _ = index.add(&chunk.embedding, i as i64);
        }
        match index.build(hora::core::metrics::Metric::CosineSimilarity) {
            Ok(()) => Some(index),
            Err(e) => {
                warn!("failed to build ANN index, falling back to linear scan: {e}");
                None
            }
        }
    }

    fn candidate_indices(&self, filters: &Filters) -> Vec<usize> {
        if filters.is_effectively_empty() {
            return (0..self.chunks.len()).collect();
        }
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                let doc_ok = filters.doc_id.is_empty() || filters.doc_id.contains(&c.doc_id);
                let title_ok = filters.exact_title.is_empty()
                    || self
                        .doc_titles
                        .get(&c.doc_id)
                        .map(|title| filters.exact_title.iter().any(|t| t == title))
                        .unwrap_or(false);
                doc_ok && title_ok
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn search(&self, query: &[f32], k: usize, filters: &Filters) -> Vec<ScoredChunk> {
        let candidates = self.candidate_indices(filters);

        #[cfg(feature = "ann")]
        if filters.is_effectively_empty() {
            if let Some(ann) = &self.ann {
                let neighbors: Vec<i64> = ann.search(query, k.max(1) * 4);
                let mut scored: Vec<ScoredChunk> = neighbors
                    .into_iter()
                    .filter_map(|idx| {
                        let chunk = self.chunks.get(idx as usize)?;
                        let score = cosine_similarity(query, &chunk.embedding);
                        Some(ScoredChunk {
                            chunk: chunk.clone(),
                            score,
                        })
                    })
                    .collect();
                sort_scored(&mut scored);
                scored.truncate(k);
                return scored;
            }
        }

        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .map(|i| {
                let chunk = &self.chunks[i];
                ScoredChunk {
                    chunk: chunk.clone(),
                    score: cosine_similarity(query, &chunk.embedding),
                }
            })
            .collect();
        sort_scored(&mut scored);
        scored.truncate(k);
        scored
    }
}

/// Strictly descending score; ties broken by chunk_index ascending.
fn sort_scored(scored: &mut [ScoredChunk]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}

pub struct VectorIndex {
    collections: RwLock<HashMap<String, CollectionIndex>>,
    embeddings_available: bool,
}

impl VectorIndex {
    /// Builds the index without title data; `exact_title` filters will
    /// never match (equivalent to omitting that key). Prefer
    /// [`VectorIndex::build_with_titles`] when the `exact_title` smart
    /// filter is in use.
    pub fn build(chunks_by_collection: HashMap<String, Vec<Chunk>>) -> Self {
        Self::build_with_titles(chunks_by_collection, HashMap::new())
    }

    /// Builds the index with a `collection_id -> (doc_id -> title)` map so
    /// the `exact_title` filter can be resolved against the chunk's owning
    /// document, which carries no title of its own.
    pub fn build_with_titles(
        chunks_by_collection: HashMap<String, Vec<Chunk>>,
        mut doc_titles_by_collection: HashMap<String, HashMap<String, String>>,
    ) -> Self {
        let collections = chunks_by_collection
            .into_iter()
            .map(|(id, chunks)| {
                let doc_titles = doc_titles_by_collection.remove(&id).unwrap_or_default();
                (id, CollectionIndex::new(chunks, doc_titles))
            })
            .collect();
        Self {
            collections: RwLock::new(collections),
            embeddings_available: true,
        }
    }

    /// Construct an index that always reports `EmbeddingUnavailable` — used
    /// by tests/fallback paths exercising the degraded-mode contract.
    pub fn unavailable() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            embeddings_available: false,
        }
    }

    pub fn search(
        &self,
        collection_id: &str,
        query_embedding: &[f32],
        k: usize,
        filters: &Filters,
    ) -> Result<Vec<ScoredChunk>> {
        if !self.embeddings_available {
            return Err(RetrievalError::EmbeddingUnavailable);
        }
        let guard = self.collections.read().map_err(|_| {
            RetrievalError::Other(anyhow::anyhow!("vector index lock poisoned"))
        })?;
        let Some(index) = guard.get(collection_id) else {
            return Ok(Vec::new());
        };
        Ok(index.search(query_embedding, k, filters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc_id: &str, idx: usize, embedding: Vec<f32>) -> Chunk {
        Chunk {
            collection_id: "c1".into(),
            doc_id: doc_id.into(),
            chunk_index: idx,
            source_path: "x".into(),
            content: format!("content {idx}"),
            embedding,
        }
    }

    fn small_embedding(seed: f32) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[0] = seed;
        v[1] = 1.0 - seed;
        v
    }

    #[test]
    fn search_orders_descending_by_score() {
        let mut chunks_by_collection = HashMap::new();
        chunks_by_collection.insert(
            "c1".to_string(),
            vec![
                chunk("d1", 0, small_embedding(0.1)),
                chunk("d1", 1, small_embedding(0.9)),
            ],
        );
        let index = VectorIndex::build(chunks_by_collection);
        let query = small_embedding(0.9);
        let results = index.search("c1", &query, 10, &Filters::default()).unwrap();
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn ties_break_by_chunk_index_ascending() {
        let embedding = small_embedding(0.5);
        let mut chunks_by_collection = HashMap::new();
        chunks_by_collection.insert(
            "c1".to_string(),
            vec![
                chunk("d1", 5, embedding.clone()),
                chunk("d1", 2, embedding.clone()),
                chunk("d1", 3, embedding.clone()),
            ],
        );
        let index = VectorIndex::build(chunks_by_collection);
        let results = index.search("c1", &embedding, 10, &Filters::default()).unwrap();
        let indices: Vec<usize> = results.iter().map(|r| r.chunk.chunk_index).collect();
        assert_eq!(indices, vec![2, 3, 5]);
    }

    #[test]
    fn unknown_filter_keys_degrade_to_unfiltered() {
        let mut raw = HashMap::new();
        raw.insert("bogus_key".to_string(), vec!["x".to_string()]);
        let filters = Filters::from_raw(&raw);
        assert!(filters.is_effectively_empty());
    }

    #[test]
    fn doc_id_filter_restricts_candidates() {
        let mut chunks_by_collection = HashMap::new();
        chunks_by_collection.insert(
            "c1".to_string(),
            vec![
                chunk("d1", 0, small_embedding(0.5)),
                chunk("d2", 0, small_embedding(0.5)),
            ],
        );
        let index = VectorIndex::build(chunks_by_collection);
        let filters = Filters {
            doc_id: vec!["d2".to_string()],
            ..Default::default()
        };
        let results = index
            .search("c1", &small_embedding(0.5), 10, &filters)
            .unwrap();
        assert!(results.iter().all(|r| r.chunk.doc_id == "d2"));
    }

    #[test]
    fn exact_title_filter_with_no_doc_id_restricts_to_matching_title() {
        let mut chunks_by_collection = HashMap::new();
        chunks_by_collection.insert(
            "c1".to_string(),
            vec![
                chunk("d1", 0, small_embedding(0.5)),
                chunk("d2", 0, small_embedding(0.5)),
            ],
        );
        let mut titles = HashMap::new();
        titles.insert("d1".to_string(), "Đăng ký khai sinh".to_string());
        titles.insert("d2".to_string(), "Đăng ký kết hôn".to_string());
        let mut titles_by_collection = HashMap::new();
        titles_by_collection.insert("c1".to_string(), titles);

        let index = VectorIndex::build_with_titles(chunks_by_collection, titles_by_collection);
        let filters = Filters {
            exact_title: vec!["Đăng ký kết hôn".to_string()],
            ..Default::default()
        };
        let results = index
            .search("c1", &small_embedding(0.5), 10, &filters)
            .unwrap();
        assert!(results.iter().all(|r| r.chunk.doc_id == "d2"));
    }

    #[test]
    fn exact_title_filter_with_unknown_title_returns_no_candidates() {
        let mut chunks_by_collection = HashMap::new();
        chunks_by_collection.insert(
            "c1".to_string(),
            vec![chunk("d1", 0, small_embedding(0.5))],
        );
        let mut titles = HashMap::new();
        titles.insert("d1".to_string(), "Đăng ký khai sinh".to_string());
        let mut titles_by_collection = HashMap::new();
        titles_by_collection.insert("c1".to_string(), titles);

        let index = VectorIndex::build_with_titles(chunks_by_collection, titles_by_collection);
        let filters = Filters {
            exact_title: vec!["Không tồn tại".to_string()],
            ..Default::default()
        };
        let results = index
            .search("c1", &small_embedding(0.5), 10, &filters)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn unavailable_index_fails_the_call() {
        let index = VectorIndex::unavailable();
        let err = index
            .search("c1", &small_embedding(0.5), 10, &Filters::default())
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingUnavailable));
    }

    #[test]
    fn missing_collection_returns_empty() {
        let index = VectorIndex::build(HashMap::new());
        let results = index
            .search("missing", &small_embedding(0.5), 10, &Filters::default())
            .unwrap();
        assert!(results.is_empty());
    }
}
