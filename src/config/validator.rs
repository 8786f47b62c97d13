use crate::config::{Config, SCHEMA_VERSION};
use crate::embedding::HashingProvider;
use crate::error::{FeedsenseError, Result, ValidationError};

const KNOWN_MODELS: &[&str] = &[
    "all-MiniLM-L6-v2",
    "all-minilm-l6-v2",
    "bge-small-en-v1.5",
    "bge-base-en-v1.5",
    HashingProvider::MODEL_NAME,
];

/// Configuration validator
///
/// Collects every problem instead of stopping at the first one.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_learning(config, &mut errors);
        Self::validate_ranking(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FeedsenseError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.max_chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.max_chunk_size",
                "Max chunk size must be greater than 0",
            ));
        }
        if chunking.min_chunk_size > chunking.max_chunk_size {
            errors.push(ValidationError::new(
                "chunking.min_chunk_size",
                format!(
                    "Min chunk size {} exceeds max chunk size {}",
                    chunking.min_chunk_size, chunking.max_chunk_size
                ),
            ));
        }
        if chunking.overlap_size >= chunking.max_chunk_size {
            errors.push(ValidationError::new(
                "chunking.overlap_size",
                format!(
                    "Overlap {} must be smaller than max chunk size {}",
                    chunking.overlap_size, chunking.max_chunk_size
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if !KNOWN_MODELS.contains(&embedding.model.as_str()) {
            errors.push(ValidationError::new(
                "embedding.model",
                format!(
                    "Model must be one of {:?}, got '{}'",
                    KNOWN_MODELS, embedding.model
                ),
            ));
        }
        if embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }
        if embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
        if embedding.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrent",
                "Max concurrent batches must be greater than 0",
            ));
        }
        if embedding.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let indexing = &config.indexing;

        if indexing.vector_dim != config.embedding.dimension {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                format!(
                    "Vector dimension {} does not match embedding dimension {}",
                    indexing.vector_dim, config.embedding.dimension
                ),
            ));
        }
        if indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }
        if indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }
        if indexing.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "indexing.search_multiplier",
                "Search multiplier must be greater than 0",
            ));
        }
        if !(-1.0..=1.0).contains(&indexing.min_similarity) {
            errors.push(ValidationError::new(
                "indexing.min_similarity",
                format!(
                    "Min similarity must be between -1.0 and 1.0, got {}",
                    indexing.min_similarity
                ),
            ));
        }
    }

    fn validate_learning(config: &Config, errors: &mut Vec<ValidationError>) {
        let learning = &config.learning;

        if learning.min_positive_events == 0 || learning.min_negative_events == 0 {
            errors.push(ValidationError::new(
                "learning.min_positive_events",
                "Event thresholds must be greater than 0",
            ));
        }
        if !is_positive(learning.demote_ratio) {
            errors.push(ValidationError::new(
                "learning.demote_ratio",
                format!("Demote ratio must be positive, got {}", learning.demote_ratio),
            ));
        }
        if !is_positive(learning.confidence_scale) {
            errors.push(ValidationError::new(
                "learning.confidence_scale",
                format!(
                    "Confidence scale must be positive, got {}",
                    learning.confidence_scale
                ),
            ));
        }
    }

    fn validate_ranking(config: &Config, errors: &mut Vec<ValidationError>) {
        let weights = &config.ranking.weights;

        let all = [
            ("ranking.weights.relevance", weights.relevance),
            ("ranking.weights.topic_match", weights.topic_match),
            ("ranking.weights.recency", weights.recency),
            ("ranking.weights.source", weights.source),
        ];
        for (path, weight) in all {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be a non-negative number, got {}", weight),
                ));
            }
        }
        if !is_positive(weights.sum()) {
            errors.push(ValidationError::new(
                "ranking.weights",
                "At least one ranking weight must be positive",
            ));
        }
        if !is_positive(config.ranking.recency_half_life_hours) {
            errors.push(ValidationError::new(
                "ranking.recency_half_life_hours",
                "Recency half-life must be positive",
            ));
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
