//! Embedder trait and shared types for text embedding.
//!
//! Posts and queries must go through the same implementation, otherwise
//! similarity scores are meaningless.
pub mod download;
pub mod hashing;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("malformed embedding: {0}")]
    MalformedOutput(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` so the facade can be moved
/// between threads.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return;
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    for v in vec.iter_mut() {
        *v *= inv_norm;
    }
}

/// Reject embeddings that cannot be compared: empty, wrong length, or
/// containing NaN/infinite components.
pub fn check_embedding(vec: &[f32], dimensions: usize) -> Result<(), EmbeddingError> {
    if vec.is_empty() {
        return Err(EmbeddingError::MalformedOutput("empty vector".to_string()));
    }
    if vec.len() != dimensions {
        return Err(EmbeddingError::MalformedOutput(format!(
            "expected {dimensions} dimensions, got {}",
            vec.len()
        )));
    }
    if vec.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::MalformedOutput(
            "non-finite component".to_string(),
        ));
    }
    Ok(())
}
