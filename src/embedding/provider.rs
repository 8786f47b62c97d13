/// Embedding provider trait, FastEmbed and hashing implementations
use super::{EmbeddingConfig, EmbeddingError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

/// Trait for embedding providers
///
/// Allows abstraction over different embedding backends (FastEmbed, remote APIs, etc.)
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, index-aligned with the input
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Build the provider named by the configuration
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    if config.model == HashingProvider::MODEL_NAME {
        return Ok(Arc::new(HashingProvider::new(config.dimension)?));
    }

    let provider = FastEmbedProvider::new(&config.model)?;
    if provider.dimension() != config.dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: config.dimension,
            actual: provider.dimension(),
        });
    }
    Ok(Arc::new(provider))
}

/// FastEmbed provider for local embedding generation
///
/// Uses all-MiniLM-L6-v2 model (384 dimensions) by default.
/// Optimized for offline operation with no API calls.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand to `~/.cache/huggingface/`
    /// on first use. The smallest model (all-MiniLM-L6-v2) is ~90MB.
    /// Larger models:
    /// - all-MiniLM-L6-v2: 90MB (384 dims) - recommended for most use cases
    /// - bge-small-en-v1.5: 130MB (384 dims) - better accuracy
    /// - bge-base-en-v1.5: 440MB (768 dims) - highest accuracy
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384, 90),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384, 130),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768, 440),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, hashing",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        // Will download to ~/.cache/huggingface/ if not present
        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empty texts would shift every later result, so reject instead
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at batch position {}",
                pos
            )));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Feature-hashing bag-of-words embedder
///
/// Each lowercase alphanumeric token is hashed with BLAKE3 into a signed
/// bucket; the result is L2-normalized. Texts sharing vocabulary land close
/// together. Deterministic and requires no model download.
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    pub const MODEL_NAME: &'static str = "hashing";

    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Hashing dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl EmbeddingProvider for HashingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        Ok(self.vectorize(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (mag_a * mag_b)
    }

    #[test]
    fn test_hashing_deterministic_and_normalized() {
        let provider = HashingProvider::new(64).unwrap();
        let a = provider.embed("Central bank raises interest rates").unwrap();
        let b = provider.embed("Central bank raises interest rates").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hashing_shared_vocabulary_is_closer() {
        let provider = HashingProvider::new(256).unwrap();
        let rates = provider.embed("bank raises interest rates again").unwrap();
        let rates2 = provider.embed("interest rates rise as bank acts").unwrap();
        let football = provider.embed("striker scores twice in cup final").unwrap();

        assert!(cosine_similarity(&rates, &rates2) > cosine_similarity(&rates, &football));
    }

    #[test]
    fn test_hashing_batch_alignment() {
        let provider = HashingProvider::new(32).unwrap();
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let batch = provider.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], provider.embed("two").unwrap());
    }

    #[test]
    fn test_hashing_rejects_empty() {
        let provider = HashingProvider::new(32).unwrap();
        assert!(provider.embed("  ").is_err());
        assert!(HashingProvider::new(0).is_err());
    }

    #[test]
    fn test_provider_from_config_hashing() {
        let config = EmbeddingConfig {
            model: "hashing".to_string(),
            dimension: 48,
            ..EmbeddingConfig::default()
        };
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.dimension(), 48);
        assert_eq!(provider.model_name(), "hashing");
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_fastembed_batch_embedding() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let texts = vec![
            "First test sentence.".to_string(),
            "Second test sentence.".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        for embedding in embeddings {
            assert_eq!(embedding.len(), 384);
        }
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_fastembed_semantic_similarity() {
        let provider = FastEmbedProvider::with_default_model().unwrap();

        let emb1 = provider.embed("The cat sits on the mat.").unwrap();
        let emb2 = provider.embed("A feline rests on the rug.").unwrap();
        let emb3 = provider.embed("Python programming language.").unwrap();

        assert!(cosine_similarity(&emb1, &emb2) > cosine_similarity(&emb1, &emb3));
    }
}
