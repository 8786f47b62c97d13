//! Vector similarity index
//!
//! Stores chunk vectors with their metadata and serves filtered k-NN search.
//! Small indexes are scanned exactly; larger ones go through an HNSW graph
//! (cosine distance) that is built lazily on first insertion and extended
//! incrementally. Persistence writes a checksummed, zstd-compressed snapshot.

mod persist;
mod vector_index;

pub use persist::{IndexManifest, INDEX_FORMAT_VERSION};
pub use vector_index::{InsertReport, SearchMetrics, SearchOutcome, VectorIndex};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Persisted index not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Persisted index is corrupted: {0}")]
    Corrupted(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid query vector: {0}")]
    InvalidQuery(String),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Configuration for the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector dimension (must match embedding dimension)
    pub vector_dim: usize,
    /// HNSW construction parameter (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// HNSW M parameter (number of connections per layer)
    pub hnsw_m: usize,
    /// HNSW search parameter (higher = better recall, slower search)
    pub ef_search: usize,
    /// Capacity hint for the HNSW graph
    pub max_elements: usize,
    /// Candidates below this cosine similarity are never returned
    pub min_similarity: f32,
    /// Indexes up to this size are searched exhaustively
    pub exact_search_threshold: usize,
    /// Over-fetch factor so post-filters still leave k results
    pub search_multiplier: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vector_dim: 384,
            hnsw_ef_construction: 200,
            hnsw_m: 16,
            ef_search: 64,
            max_elements: 100_000,
            min_similarity: 0.0,
            exact_search_threshold: 2_000,
            search_multiplier: 4,
        }
    }
}
