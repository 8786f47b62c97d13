/// Embedding generation
///
/// This module turns chunk texts into fixed-dimension vectors.
/// Architecture:
/// - EmbeddingProvider trait for abstraction over backends
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - HashingProvider for deterministic, download-free embedding
/// - EmbeddingGenerator for bounded-concurrency batches with retry
/// - validate_embedding to keep broken vectors out of the index
mod batch;
mod provider;
mod validate;

pub use batch::{EmbeddingBatchOutput, EmbeddingGenerator, EmbeddingOutcome, ProcessingMetrics};
pub use provider::{provider_from_config, EmbeddingProvider, FastEmbedProvider, HashingProvider};
pub use validate::validate_embedding;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding is empty")]
    EmptyEmbedding,

    #[error("Embedding contains non-finite value at position {position}")]
    NonFinite { position: usize },

    #[error("Embedding is all zeros")]
    ZeroVector,

    #[error("Embedding call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Batch failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

/// Configuration for embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2", or "hashing")
    pub model: String,
    /// Embedding dimension (384 for MiniLM)
    pub dimension: usize,
    /// Number of texts per provider call
    pub batch_size: usize,
    /// Maximum provider calls in flight
    pub max_concurrent: usize,
    /// Retries per batch after the first attempt
    pub max_retries: u32,
    /// Base backoff, doubled on every retry
    pub retry_backoff_ms: u64,
    /// Per-call timeout; a timeout counts as a retryable failure
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
            max_concurrent: 4,
            max_retries: 3,
            retry_backoff_ms: 200,
            timeout_ms: 30_000,
        }
    }
}
