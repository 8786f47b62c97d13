/// Batch embedding generation with retry and per-item failure isolation
use super::{validate_embedding, EmbeddingConfig, EmbeddingError, EmbeddingProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Per-item result, index-aligned with the generator input
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingOutcome {
    Embedded(Vec<f32>),
    Failed(EmbeddingError),
}

impl EmbeddingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Embedded(_))
    }

    /// The vector, or the empty placeholder for a failed item
    pub fn vector(&self) -> &[f32] {
        match self {
            Self::Embedded(v) => v,
            Self::Failed(_) => &[],
        }
    }

    pub fn into_vector(self) -> Vec<f32> {
        match self {
            Self::Embedded(v) => v,
            Self::Failed(_) => Vec::new(),
        }
    }

    pub fn error(&self) -> Option<&EmbeddingError> {
        match self {
            Self::Embedded(_) => None,
            Self::Failed(e) => Some(e),
        }
    }
}

/// Metrics reported for a generation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingMetrics {
    pub total_chunks: usize,
    pub successful: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub batch_count: usize,
    pub errors: Vec<String>,
}

/// Output of [`EmbeddingGenerator::generate`]
#[derive(Debug, Clone)]
pub struct EmbeddingBatchOutput {
    pub embeddings: Vec<EmbeddingOutcome>,
    pub metrics: ProcessingMetrics,
}

/// Batch generator for embeddings
///
/// - splits input into `batch_size` provider calls
/// - keeps at most `max_concurrent` calls in flight
/// - retries failed or timed-out calls with exponential backoff
/// - marks items of an exhausted batch failed without aborting the rest
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
}

impl EmbeddingGenerator {
    /// Create a new generator
    ///
    /// # Arguments
    /// * `provider` - Embedding backend
    /// * `config` - Batch size, concurrency, retry and timeout settings
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbeddingConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embed `texts`, returning one outcome per input in the same order
    pub async fn generate(&self, texts: &[String]) -> EmbeddingBatchOutput {
        let start = Instant::now();
        let total = texts.len();
        let batch_size = self.config.batch_size.max(1);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        info!("Starting embedding generation of {} chunks", total);

        // A permit is taken before each spawn, so at most `max_concurrent`
        // batches are copied and in flight at any time
        let mut handles = Vec::new();
        for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    handles.push(Err(EmbeddingError::GenerationError(e.to_string())));
                    continue;
                }
            };
            let provider = self.provider.clone();
            let config = self.config.clone();
            let batch = batch.to_vec();

            handles.push(Ok(tokio::spawn(async move {
                let result = embed_with_retry(provider, batch, &config, batch_idx).await;
                drop(permit);
                result
            })));
        }

        let batch_count = handles.len();
        let mut embeddings = Vec::with_capacity(total);
        let mut errors = Vec::new();

        for (batch_idx, handle) in handles.into_iter().enumerate() {
            let batch_len = batch_len(total, batch_size, batch_idx);

            let result = match handle {
                Ok(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(EmbeddingError::GenerationError(format!(
                        "Batch task panicked: {}",
                        e
                    ))),
                },
                Err(e) => Err(e),
            };

            match result {
                Ok(vectors) => {
                    for (offset, vector) in vectors.into_iter().enumerate() {
                        match validate_embedding(&vector, self.provider.dimension()) {
                            Ok(()) => embeddings.push(EmbeddingOutcome::Embedded(vector)),
                            Err(e) => {
                                let item = batch_idx * batch_size + offset;
                                warn!("Invalid embedding for chunk {}: {}", item, e);
                                errors.push(format!("chunk {}: {}", item, e));
                                embeddings.push(EmbeddingOutcome::Failed(e));
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Batch {} failed: {}", batch_idx, e);
                    errors.push(format!("batch {}: {}", batch_idx, e));
                    embeddings.extend((0..batch_len).map(|_| EmbeddingOutcome::Failed(e.clone())));
                }
            }
        }

        let successful = embeddings.iter().filter(|e| e.is_success()).count();
        let metrics = ProcessingMetrics {
            total_chunks: total,
            successful,
            failed: total - successful,
            elapsed_ms: start.elapsed().as_millis() as u64,
            batch_count,
            errors,
        };

        info!(
            "Embedding generation complete: {} succeeded, {} failed, {} batches, {}ms",
            metrics.successful, metrics.failed, metrics.batch_count, metrics.elapsed_ms
        );

        EmbeddingBatchOutput {
            embeddings,
            metrics,
        }
    }

    /// Embed a single text, used to resolve text queries
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let output = self.generate(&[text.to_string()]).await;
        match output.embeddings.into_iter().next() {
            Some(EmbeddingOutcome::Embedded(v)) => Ok(v),
            Some(EmbeddingOutcome::Failed(e)) => Err(e),
            None => Err(EmbeddingError::GenerationError(
                "No embedding generated".to_string(),
            )),
        }
    }
}

fn batch_len(total: usize, batch_size: usize, batch_idx: usize) -> usize {
    let start = batch_idx * batch_size;
    (total - start).min(batch_size)
}

/// Run one provider call with timeout, retrying with exponential backoff
async fn embed_with_retry(
    provider: Arc<dyn EmbeddingProvider>,
    batch: Vec<String>,
    config: &EmbeddingConfig,
    batch_idx: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let attempts = config.max_retries + 1;
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut last_error = None;

    for attempt in 0..attempts {
        let call_provider = provider.clone();
        let call_batch = batch.clone();
        let call = tokio::task::spawn_blocking(move || call_provider.embed_batch(&call_batch));

        let error = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(vectors))) if vectors.len() == batch.len() => {
                debug!(
                    "Batch {} embedded {} texts on attempt {}",
                    batch_idx,
                    batch.len(),
                    attempt + 1
                );
                return Ok(vectors);
            }
            Ok(Ok(Ok(vectors))) => EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                batch.len(),
                vectors.len()
            )),
            Ok(Ok(Err(e))) => e,
            Ok(Err(join_error)) => EmbeddingError::GenerationError(join_error.to_string()),
            Err(_) => EmbeddingError::Timeout {
                timeout_ms: config.timeout_ms,
            },
        };

        if attempt + 1 < attempts {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(1u64 << attempt.min(16));
            warn!(
                "Batch {} attempt {} failed: {}; retrying in {}ms",
                batch_idx,
                attempt + 1,
                error,
                backoff
            );
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
        last_error = Some(error);
    }

    Err(EmbeddingError::RetriesExhausted {
        attempts,
        message: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}
