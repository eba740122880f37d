//! Loads a scraper export into the post store.
//!
//! The export is a JSON array of objects with `author_name`, `comment_text`,
//! `post_date` and `comment_id`. Every field is optional; posts without text
//! are skipped.
use std::fs;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::embedder::{Embedder, EmbeddingError, check_embedding};
use crate::store::{NewPost, SqliteStore, StoreError};

/// Source tag used when the caller gives none.
pub const DEFAULT_SOURCE: &str = "forums.iracing.com";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid export format: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One scraped comment as exported.
#[derive(Debug, Default, Deserialize)]
pub struct ScrapedPost {
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub comment_text: Option<String>,
    #[serde(default)]
    pub post_date: Option<String>,
    #[serde(default)]
    pub comment_id: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Parse `path` and store every post with text.
pub fn ingest_file<P: AsRef<Path>>(
    store: &mut SqliteStore,
    embedder: &dyn Embedder,
    path: P,
    source: &str,
) -> Result<IngestSummary, IngestError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| IngestError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let posts: Vec<ScrapedPost> = serde_json::from_str(&raw)?;
    info!(file = %path.display(), posts = posts.len(), "ingesting export");

    ingest_posts(store, embedder, &posts, source)
}

/// Store already-parsed posts. A post whose embedding fails is counted and
/// skipped; store errors abort the run.
pub fn ingest_posts(
    store: &mut SqliteStore,
    embedder: &dyn Embedder,
    posts: &[ScrapedPost],
    source: &str,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();

    let pb = ProgressBar::new(posts.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:40} {pos}/{len} posts") {
        pb.set_style(style);
    }

    for post in posts {
        pb.inc(1);

        let text = post.comment_text.as_deref().unwrap_or_default();
        if text.trim().is_empty() {
            summary.skipped += 1;
            continue;
        }

        let embedding = match embed_checked(embedder, text) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(comment_id = ?post.comment_id, "skipping post: {e}");
                summary.failed += 1;
                continue;
            }
        };

        let record = NewPost {
            source,
            author: post
                .author_name
                .as_deref()
                .filter(|a| !a.trim().is_empty())
                .unwrap_or("Unknown"),
            date: post.post_date.as_deref().unwrap_or_default(),
            text,
            comment_id: post.comment_id.as_deref().filter(|c| !c.is_empty()),
        };
        store.insert_post(&record, &embedding)?;
        summary.inserted += 1;
    }

    pb.finish_and_clear();
    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        failed = summary.failed,
        "ingest finished"
    );
    Ok(summary)
}

fn embed_checked(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let embedding = embedder.embed(text)?;
    check_embedding(&embedding, embedder.dimensions())?;
    Ok(embedding)
}
