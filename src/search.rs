//! Similarity search strategies.
//!
//! Both strategies rank by cosine similarity, highest first, ties broken by
//! ascending post id, so swapping one for the other never changes results
//! beyond float rounding.
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::store::{PostStore, SearchResult, StoreError};

/// Which strategy to use, as configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Native when the store supports it, scan otherwise.
    #[default]
    Auto,
    Native,
    Scan,
}

/// Ranks stored posts against a query embedding.
pub trait SimilaritySearcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn search(
        &self,
        store: &dyn PostStore,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError>;
}

/// Delegates ranking to the store's vector operator (sqlite-vec).
pub struct NativeSearcher;

impl SimilaritySearcher for NativeSearcher {
    fn name(&self) -> &'static str {
        "native"
    }

    fn search(
        &self,
        store: &dyn PostStore,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        store.native_search(query, limit)
    }
}

/// Loads every embedding and ranks in process.
pub struct ScanSearcher;

impl SimilaritySearcher for ScanSearcher {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn search(
        &self,
        store: &dyn PostStore,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        if limit == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(i64, f64)> = Vec::new();
        let mut skipped = 0usize;
        for (id, embedding) in store.embeddings()? {
            if embedding.len() != query.len() {
                skipped += 1;
                continue;
            }
            scored.push((id, cosine_similarity(query, &embedding)));
        }
        if skipped > 0 {
            warn!(
                skipped,
                dimensions = query.len(),
                "embeddings with mismatched dimensions are unsearchable"
            );
        }

        let ranked = top_k(scored, limit);
        let ids: Vec<i64> = ranked.iter().map(|(id, _)| *id).collect();
        let posts = store.get_posts(&ids)?;
        debug!(candidates = ids.len(), found = posts.len(), "scan ranked");

        // get_posts preserves the order of `ids`
        let mut scores = ranked.into_iter();
        let mut results = Vec::with_capacity(posts.len());
        for post in posts {
            for (id, similarity) in scores.by_ref() {
                if id == post.id {
                    results.push(SearchResult { post, similarity });
                    break;
                }
            }
        }
        Ok(results)
    }
}

/// Cosine similarity in `[-1, 1]`; 0 when either vector has zero norm or a
/// non-finite component.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    // NaN/inf components score like a zero vector, as sqlite-vec's NULL distance does
    if similarity.is_finite() { similarity } else { 0.0 }
}

/// Sort by similarity descending, then id ascending, and keep `k`.
fn top_k(mut scored: Vec<(i64, f64)>, k: usize) -> Vec<(i64, f64)> {
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}

/// Pick the strategy once, at startup.
///
/// `Native` on a store without the operator falls back to scan with a
/// warning rather than failing.
pub fn select_searcher(
    strategy: SearchStrategy,
    store: &dyn PostStore,
) -> Box<dyn SimilaritySearcher> {
    let native = store.capabilities().native_similarity;
    let searcher: Box<dyn SimilaritySearcher> = match strategy {
        SearchStrategy::Scan => Box::new(ScanSearcher),
        SearchStrategy::Auto | SearchStrategy::Native if native => Box::new(NativeSearcher),
        SearchStrategy::Native => {
            warn!("native vector search unavailable, falling back to in-process scan");
            Box::new(ScanSearcher)
        }
        SearchStrategy::Auto => {
            warn!("sqlite-vec not loaded, using in-process cosine scan");
            Box::new(ScanSearcher)
        }
    };
    info!("similarity search strategy: {}", searcher.name());
    searcher
}
