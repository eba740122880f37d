//! Feature-hashing embedder.
//!
//! Each lowercased alphanumeric token is hashed (FNV-1a) into one of
//! `dimensions` buckets and counted; the bag of counts is L2-normalized.
//! Texts sharing vocabulary end up close in cosine space, which is enough
//! for offline use and for tests that need lexical similarity without a
//! model on disk.
use super::{Embedder, EmbeddingError, l2_normalize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hash = FNV_OFFSET;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        (hash % self.dimensions as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

/// Split into lowercased alphanumeric tokens.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embedding = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            embedding[self.bucket(&token)] += 1.0;
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
