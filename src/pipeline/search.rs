/// Semantic search entry point
use crate::embedding::EmbeddingGenerator;
use crate::error::{FeedsenseError, Result};
use crate::index::{SearchOutcome, VectorIndex};
use crate::ranking::{PersonalizationRanker, RankedResult};
use crate::types::{Query, SearchFilters, UserPreferences};
use std::sync::Arc;
use tracing::debug;

/// Initial candidates fetched per requested result before re-ranking
const RERANK_OVERFETCH: usize = 3;

pub struct SearchService {
    index: Arc<VectorIndex>,
    generator: Arc<EmbeddingGenerator>,
}

impl SearchService {
    pub fn new(index: Arc<VectorIndex>, generator: Arc<EmbeddingGenerator>) -> Self {
        Self { index, generator }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Resolve the query to a vector and run a filtered k-NN search
    pub async fn search(&self, query: Query, filters: &SearchFilters, k: usize) -> Result<SearchOutcome> {
        let vector = self.resolve(query).await?;
        Ok(self.index.search(&vector, filters, k)?)
    }

    /// Search, then re-rank the candidates for a user
    ///
    /// The fetch starts at `k * 3` and doubles until `k` candidates survive
    /// the user's exclusions or the index has nothing more to return.
    pub async fn search_for_user(
        &self,
        query: Query,
        filters: &SearchFilters,
        k: usize,
        prefs: &UserPreferences,
        ranker: &PersonalizationRanker,
    ) -> Result<Vec<RankedResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.resolve(query).await?;
        let size = self.index.len();

        let mut fetch = k.saturating_mul(RERANK_OVERFETCH);
        loop {
            let outcome = self.index.search(&vector, filters, fetch)?;
            let exhausted = outcome.results.len() < fetch || fetch >= size;

            let mut ranked = ranker.rank(outcome.results, prefs);
            if ranked.len() >= k || exhausted {
                ranked.truncate(k);
                return Ok(ranked);
            }
            debug!(
                "Only {} of {} candidates survived exclusions, widening fetch",
                ranked.len(),
                fetch
            );
            fetch = fetch.saturating_mul(2);
        }
    }

    async fn resolve(&self, query: Query) -> Result<Vec<f32>> {
        match query {
            Query::Text(text) => {
                if text.trim().is_empty() {
                    return Err(FeedsenseError::Validation(
                        "Query text cannot be empty".to_string(),
                    ));
                }
                debug!("Embedding text query ({} chars)", text.chars().count());
                Ok(self.generator.embed_one(&text).await?)
            }
            Query::Vector(vector) => Ok(vector),
        }
    }
}
