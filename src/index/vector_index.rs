/// HNSW-backed vector index with metadata post-filtering
use super::{persist, IndexConfig, IndexError};
use crate::embedding::validate_embedding;
use crate::types::{SearchFilters, SearchResult, TextChunk};
use ahash::AHashMap;
use hnsw_rs::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, info};

/// HNSW layer cap (hnsw_rs clamps to its own maximum of 16)
const MAX_LAYERS: usize = 16;

/// Outcome of an insert call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsertReport {
    pub inserted: usize,
    pub skipped_invalid: usize,
    pub skipped_duplicate: usize,
}

/// Search diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchMetrics {
    pub elapsed_ms: u64,
    pub filters_applied: Vec<String>,
    pub index_size: usize,
    pub candidates_considered: usize,
    /// True when the index was scanned exhaustively instead of via HNSW
    pub exact: bool,
}

/// Ranked search results plus diagnostics
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub metrics: SearchMetrics,
}

impl SearchOutcome {
    fn empty(filters: &SearchFilters, index_size: usize, start: Instant) -> Self {
        Self {
            results: Vec::new(),
            metrics: SearchMetrics {
                elapsed_ms: start.elapsed().as_millis() as u64,
                filters_applied: filters.active(),
                index_size,
                candidates_considered: 0,
                exact: true,
            },
        }
    }
}

#[derive(Default)]
struct IndexState {
    /// Slot i holds the chunk whose HNSW id is i
    chunks: Vec<TextChunk>,
    by_chunk_id: AHashMap<String, usize>,
    /// First slot of every article
    by_article_id: AHashMap<String, usize>,
    /// Created on first insertion
    graph: Option<Hnsw<'static, f32, DistCosine>>,
}

/// Vector index owning its chunks
///
/// One instance per deployment or shard. Inserts take the write lock,
/// searches share the read lock.
pub struct VectorIndex {
    config: IndexConfig,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index; the HNSW graph is built on first insert
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Restore an index persisted with [`VectorIndex::persist`]
    pub fn load(dir: &Path, config: IndexConfig) -> Result<Self, IndexError> {
        let chunks = persist::read_snapshot(dir, config.vector_dim)?;
        let index = Self::new(config);
        let report = index.insert(chunks)?;

        if report.skipped_invalid > 0 || report.skipped_duplicate > 0 {
            return Err(IndexError::Corrupted(format!(
                "{} invalid and {} duplicate chunks in snapshot",
                report.skipped_invalid, report.skipped_duplicate
            )));
        }

        info!(
            "Loaded vector index from {} ({} chunks)",
            dir.display(),
            report.inserted
        );
        Ok(index)
    }

    /// Write a snapshot to `dir`; inserts wait until it completes
    pub fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        let state = self.read_state();
        persist::write_snapshot(dir, self.config.vector_dim, &state.chunks)?;
        info!(
            "Persisted vector index to {} ({} chunks)",
            dir.display(),
            state.chunks.len()
        );
        Ok(())
    }

    /// Add chunks with embeddings
    ///
    /// Chunks with an invalid embedding or no article id are skipped, as are
    /// chunk ids already present.
    pub fn insert(&self, chunks: Vec<TextChunk>) -> Result<InsertReport, IndexError> {
        let mut report = InsertReport::default();
        let mut state = self.write_state();

        for chunk in chunks {
            if chunk.article_id.trim().is_empty() {
                debug!("Skipping chunk {} without article id", chunk.id);
                report.skipped_invalid += 1;
                continue;
            }
            if let Err(e) = validate_embedding(&chunk.embedding, self.config.vector_dim) {
                debug!("Skipping chunk {}: {}", chunk.id, e);
                report.skipped_invalid += 1;
                continue;
            }
            if state.by_chunk_id.contains_key(&chunk.id) {
                report.skipped_duplicate += 1;
                continue;
            }

            let slot = state.chunks.len();
            if state.graph.is_none() {
                debug!("Creating HNSW graph (dim {})", self.config.vector_dim);
                state.graph = Some(self.new_graph());
            }
            if let Some(graph) = state.graph.as_ref() {
                graph.insert((chunk.embedding.as_slice(), slot));
            }

            state.by_chunk_id.insert(chunk.id.clone(), slot);
            state
                .by_article_id
                .entry(chunk.article_id.clone())
                .or_insert(slot);
            state.chunks.push(chunk);
            report.inserted += 1;
        }

        debug!(
            "Inserted {} chunks ({} invalid, {} duplicate)",
            report.inserted, report.skipped_invalid, report.skipped_duplicate
        );
        Ok(report)
    }

    /// Nearest neighbors of `query`, post-filtered and truncated to `k`
    ///
    /// An empty index yields an empty outcome. A query of the wrong
    /// dimension is an error, never a silently wrong answer.
    pub fn search(
        &self,
        query: &[f32],
        filters: &SearchFilters,
        k: usize,
    ) -> Result<SearchOutcome, IndexError> {
        let start = Instant::now();
        let state = self.read_state();
        let size = state.chunks.len();

        if size == 0 || k == 0 {
            return Ok(SearchOutcome::empty(filters, size, start));
        }

        if query.len() != self.config.vector_dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.vector_dim,
                actual: query.len(),
            });
        }
        validate_embedding(query, self.config.vector_dim)
            .map_err(|e| IndexError::InvalidQuery(e.to_string()))?;

        let exact = size <= self.config.exact_search_threshold || state.graph.is_none();
        let (mut hits, considered) = if exact {
            let hits = state
                .chunks
                .iter()
                .enumerate()
                .map(|(slot, chunk)| (slot, cosine_similarity(query, &chunk.embedding)))
                .filter(|(slot, score)| self.accepts(&state.chunks[*slot], *score, filters))
                .collect::<Vec<_>>();
            (hits, size)
        } else {
            self.approximate_hits(&state, query, filters, k)
        };

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| state.chunks[a.0].id.cmp(&state.chunks[b.0].id))
        });
        hits.truncate(k);

        let results = hits
            .into_iter()
            .map(|(slot, score)| SearchResult {
                chunk: state.chunks[slot].clone(),
                relevance_score: score,
            })
            .collect::<Vec<_>>();

        let metrics = SearchMetrics {
            elapsed_ms: start.elapsed().as_millis() as u64,
            filters_applied: filters.active(),
            index_size: size,
            candidates_considered: considered,
            exact,
        };

        debug!(
            "Search returned {} of {} candidates ({}ms, exact: {})",
            results.len(),
            metrics.candidates_considered,
            metrics.elapsed_ms,
            metrics.exact
        );

        Ok(SearchOutcome { results, metrics })
    }

    /// Query HNSW, widening the fetch until post-filters leave `k` hits
    fn approximate_hits(
        &self,
        state: &IndexState,
        query: &[f32],
        filters: &SearchFilters,
        k: usize,
    ) -> (Vec<(usize, f32)>, usize) {
        let size = state.chunks.len();
        let Some(graph) = state.graph.as_ref() else {
            return (Vec::new(), 0);
        };

        let mut fetch = k
            .saturating_mul(self.config.search_multiplier.max(1))
            .min(size);
        loop {
            let ef = self.config.ef_search.max(fetch);
            let hits: Vec<(usize, f32)> = graph
                .search(query, fetch, ef)
                .into_iter()
                .filter(|n| n.d_id < size)
                .map(|n| (n.d_id, 1.0 - n.distance))
                .filter(|(slot, score)| self.accepts(&state.chunks[*slot], *score, filters))
                .collect();

            if hits.len() >= k || fetch >= size {
                return (hits, fetch);
            }
            fetch = fetch.saturating_mul(2).min(size);
        }
    }

    fn accepts(&self, chunk: &TextChunk, score: f32, filters: &SearchFilters) -> bool {
        score >= self.config.min_similarity && filters.matches(chunk, score)
    }

    /// Drop all vectors and reset to the uninitialized state
    pub fn clear(&self) {
        let mut state = self.write_state();
        *state = IndexState::default();
        info!("Vector index cleared");
    }

    /// Get a chunk by id
    pub fn get(&self, chunk_id: &str) -> Option<TextChunk> {
        let state = self.read_state();
        state
            .by_chunk_id
            .get(chunk_id)
            .map(|slot| state.chunks[*slot].clone())
    }

    /// Metadata of the first chunk of an article
    pub fn article_chunk(&self, article_id: &str) -> Option<TextChunk> {
        let state = self.read_state();
        state
            .by_article_id
            .get(article_id)
            .map(|slot| state.chunks[*slot].clone())
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.read_state().chunks.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.config.vector_dim
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn new_graph(&self) -> Hnsw<'static, f32, DistCosine> {
        Hnsw::<f32, DistCosine>::new(
            self.config.hnsw_m,
            self.config.max_elements,
            MAX_LAYERS,
            self.config.hnsw_ef_construction,
            DistCosine,
        )
    }

    // A panic while holding the lock leaves the state consistent between
    // chunk pushes, so poisoned guards are recovered.
    fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cosine similarity; callers guarantee equal, non-zero vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DateRange, RawArticle};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn config() -> IndexConfig {
        IndexConfig {
            vector_dim: DIM,
            hnsw_ef_construction: 100,
            hnsw_m: 8,
            ef_search: 32,
            max_elements: 1_000,
            min_similarity: 0.0,
            exact_search_threshold: 1_000,
            search_multiplier: 4,
        }
    }

    fn axis(i: usize, noise: f32) -> Vec<f32> {
        let mut v = vec![noise; DIM];
        v[i % DIM] = 1.0;
        v
    }

    fn chunk(article: &str, idx: usize, category: &str, source: &str, day: u32, embedding: Vec<f32>) -> TextChunk {
        let article = RawArticle {
            id: article.to_string(),
            headline: format!("{} headline", article),
            content: String::new(),
            source: source.to_string(),
            category: category.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
            url: String::new(),
            tags: Vec::new(),
        };
        let mut chunk = TextChunk::from_article(&article, idx, format!("{} chunk {}", article.id, idx));
        chunk.embedding = embedding;
        chunk
    }

    fn mixed_corpus() -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        for i in 0..12 {
            let category = if i % 2 == 0 { "technology" } else { "sports" };
            let source = if i % 3 == 0 { "Reuters" } else { "AP" };
            chunks.push(chunk(&format!("a{}", i), 0, category, source, (i + 1) as u32, axis(0, 0.05 * i as f32 + 0.01)));
        }
        chunks
    }

    #[test]
    fn test_empty_index_search_is_ok() {
        let index = VectorIndex::new(config());
        assert!(index.is_empty());
        let outcome = index.search(&axis(0, 0.0), &SearchFilters::default(), 10).unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.metrics.index_size, 0);
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new(config());
        let report = index
            .insert(vec![
                chunk("a1", 0, "technology", "Reuters", 1, axis(0, 0.0)),
                chunk("a2", 0, "technology", "Reuters", 2, axis(1, 0.0)),
                chunk("a3", 0, "technology", "Reuters", 3, {
                    let mut v = axis(0, 0.0);
                    v[1] = 0.1;
                    v
                }),
            ])
            .unwrap();
        assert_eq!(report.inserted, 3);
        assert_eq!(index.len(), 3);

        let outcome = index.search(&axis(0, 0.0), &SearchFilters::default(), 2).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].chunk.id, "a1#0");
        assert_eq!(outcome.results[1].chunk.id, "a3#0");
        assert!(outcome.results[0].relevance_score > 0.99);
        assert!(outcome.results[0].relevance_score >= outcome.results[1].relevance_score);
    }

    #[test]
    fn test_invalid_embeddings_skipped() {
        let index = VectorIndex::new(config());
        let mut no_article = chunk("a4", 0, "technology", "AP", 1, axis(0, 0.0));
        no_article.article_id = String::new();

        let report = index
            .insert(vec![
                chunk("a1", 0, "technology", "AP", 1, Vec::new()),
                chunk("a2", 0, "technology", "AP", 1, vec![0.0; DIM]),
                chunk("a3", 0, "technology", "AP", 1, vec![1.0; DIM - 1]),
                no_article,
                chunk("a5", 0, "technology", "AP", 1, axis(2, 0.0)),
                chunk("a5", 0, "technology", "AP", 1, axis(2, 0.0)),
            ])
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped_invalid, 4);
        assert_eq!(report.skipped_duplicate, 1);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let index = VectorIndex::new(config());
        index
            .insert(vec![chunk("a1", 0, "technology", "AP", 1, axis(0, 0.0))])
            .unwrap();

        let err = index
            .search(&[1.0; DIM + 2], &SearchFilters::default(), 5)
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: DIM,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_category_filter() {
        let index = VectorIndex::new(config());
        index.insert(mixed_corpus()).unwrap();

        let filters = SearchFilters::default().with_categories(["sports"]);
        let outcome = index.search(&axis(0, 0.0), &filters, 10).unwrap();

        assert_eq!(outcome.results.len(), 6);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.chunk.metadata.category == "sports"));
        assert_eq!(outcome.metrics.filters_applied, vec!["category".to_string()]);
    }

    #[test]
    fn test_source_date_and_score_filters() {
        let index = VectorIndex::new(config());
        index.insert(mixed_corpus()).unwrap();

        let filters = SearchFilters::default().with_sources(["reuters"]);
        let outcome = index.search(&axis(0, 0.0), &filters, 10).unwrap();
        assert_eq!(outcome.results.len(), 4);
        assert!(outcome.results.iter().all(|r| r.chunk.metadata.source == "Reuters"));

        let range = DateRange {
            start: Some(Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2024, 3, 5, 23, 59, 59).unwrap()),
        };
        let filters = SearchFilters::default().with_date_range(range);
        let outcome = index.search(&axis(0, 0.0), &filters, 10).unwrap();
        assert_eq!(outcome.results.len(), 3);

        let filters = SearchFilters::default().with_min_relevance(0.99);
        let outcome = index.search(&axis(0, 0.0), &filters, 10).unwrap();
        assert!(outcome.results.iter().all(|r| r.relevance_score >= 0.99));
        assert!(outcome.results.len() < 12);
    }

    #[test]
    fn test_min_similarity_threshold() {
        let mut cfg = config();
        cfg.min_similarity = 0.5;
        let index = VectorIndex::new(cfg);
        index
            .insert(vec![
                chunk("a1", 0, "technology", "AP", 1, axis(0, 0.0)),
                chunk("a2", 0, "technology", "AP", 1, axis(1, 0.0)),
            ])
            .unwrap();

        let outcome = index.search(&axis(0, 0.0), &SearchFilters::default(), 10).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].chunk.article_id, "a1");
    }

    #[test]
    fn test_hnsw_path_respects_filters() {
        let mut cfg = config();
        cfg.exact_search_threshold = 0;
        let index = VectorIndex::new(cfg);

        let mut chunks = Vec::new();
        for i in 0..60 {
            let category = if i % 5 == 0 { "sports" } else { "technology" };
            chunks.push(chunk(&format!("a{}", i), 0, category, "AP", 1 + (i % 28) as u32, axis(i % DIM, 0.02 * (i / DIM) as f32 + 0.01)));
        }
        index.insert(chunks).unwrap();

        let filters = SearchFilters::default().with_categories(["sports"]);
        let outcome = index.search(&axis(0, 0.0), &filters, 10).unwrap();

        assert!(!outcome.metrics.exact);
        assert!(!outcome.results.is_empty());
        assert!(outcome.results.len() <= 10);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.chunk.metadata.category == "sports"));
    }

    #[test]
    fn test_clear() {
        let index = VectorIndex::new(config());
        index.insert(mixed_corpus()).unwrap();
        assert_eq!(index.len(), 12);

        index.clear();
        assert!(index.is_empty());
        assert!(index.get("a1#0").is_none());

        // Usable again after a clear
        index
            .insert(vec![chunk("b1", 0, "science", "AP", 1, axis(3, 0.0))])
            .unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_lookup_helpers() {
        let index = VectorIndex::new(config());
        index
            .insert(vec![
                chunk("a1", 0, "technology", "AP", 1, axis(0, 0.0)),
                chunk("a1", 1, "technology", "AP", 1, axis(1, 0.0)),
            ])
            .unwrap();

        assert_eq!(index.get("a1#1").unwrap().metadata.chunk_index, 1);
        assert_eq!(index.article_chunk("a1").unwrap().id, "a1#0");
        assert!(index.article_chunk("zzz").is_none());
    }

    #[test]
    fn test_persist_and_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");

        let index = VectorIndex::new(config());
        index.insert(mixed_corpus()).unwrap();
        index.persist(&dir).unwrap();

        let loaded = VectorIndex::load(&dir, config()).unwrap();
        assert_eq!(loaded.len(), 12);

        let filters = SearchFilters::default().with_categories(["technology"]);
        let before = index.search(&axis(0, 0.0), &filters, 5).unwrap();
        let after = loaded.search(&axis(0, 0.0), &filters, 5).unwrap();
        let ids = |o: &SearchOutcome| o.results.iter().map(|r| r.chunk.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
    }

    #[test]
    fn test_load_missing_and_wrong_dimension() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");
        assert!(matches!(
            VectorIndex::load(&dir, config()),
            Err(IndexError::NotFound(_))
        ));

        let index = VectorIndex::new(config());
        index.insert(mixed_corpus()).unwrap();
        index.persist(&dir).unwrap();

        let mut other = config();
        other.vector_dim = DIM * 2;
        assert!(matches!(
            VectorIndex::load(&dir, other),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }
}
