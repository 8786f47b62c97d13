use super::EmbeddingError;

/// Check that an embedding can be indexed
///
/// Invalid when empty, of the wrong dimension, containing NaN or infinity,
/// or entirely zero (cosine similarity is undefined for the zero vector).
pub fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<(), EmbeddingError> {
    if embedding.is_empty() {
        return Err(EmbeddingError::EmptyEmbedding);
    }

    if embedding.len() != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }

    if let Some(position) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::NonFinite { position });
    }

    if embedding.iter().all(|v| *v == 0.0) {
        return Err(EmbeddingError::ZeroVector);
    }

    Ok(())
}
