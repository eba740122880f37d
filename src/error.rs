//! Crate-level error type surfaced by the query facade and the CLI.
//!
//! Each component keeps its own error enum; this one only groups them so a
//! caller can match on the failing stage.
use thiserror::Error;

use crate::embedder::EmbeddingError;
use crate::generator::GenerationError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing credential, missing database file, or invalid settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("post {0} not found")]
    NotFound(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
