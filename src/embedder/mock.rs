//! Mock embedder for testing purposes.
//!
//! Returns hand-picked vectors for known texts so tests can control exact
//! geometry, and can be switched into a failing mode to exercise the
//! embedding error path.
use std::collections::HashMap;

use super::{Embedder, EmbeddingError};

/// A mock embedder backed by a fixture table.
pub struct MockEmbedder {
    pub dimensions: usize,
    fixtures: HashMap<String, Vec<f32>>,
    unreachable: bool,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality and no fixtures.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fixtures: HashMap::new(),
            unreachable: false,
        }
    }

    /// An embedder that fails every call, as if the model were unreachable.
    #[must_use]
    pub fn unreachable(dimensions: usize) -> Self {
        Self {
            unreachable: true,
            ..Self::new(dimensions)
        }
    }

    /// Register the vector returned for `text`.
    #[must_use]
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixtures.insert(text.to_string(), vector);
        self
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.unreachable {
            return Err(EmbeddingError::InferenceFailed(
                "embedding model unreachable".to_string(),
            ));
        }

        self.fixtures.get(text).cloned().ok_or_else(|| {
            EmbeddingError::InferenceFailed(format!("no fixture vector for {text:?}"))
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
