//! Query embedding plus similarity search.
use tracing::debug;

use crate::embedder::{Embedder, check_embedding};
use crate::error::Result;
use crate::search::SimilaritySearcher;
use crate::store::{PostStore, SearchResult};

pub struct Retriever {
    embedder: Box<dyn Embedder>,
    searcher: Box<dyn SimilaritySearcher>,
}

impl Retriever {
    pub fn new(embedder: Box<dyn Embedder>, searcher: Box<dyn SimilaritySearcher>) -> Self {
        Self { embedder, searcher }
    }

    /// Top `limit` posts for `query`, most similar first.
    ///
    /// An empty store or `limit == 0` yields an empty list, not an error.
    pub fn search(
        &self,
        store: &dyn PostStore,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query)?;
        check_embedding(&query_vector, self.embedder.dimensions())?;

        let results = self.searcher.search(store, &query_vector, limit)?;
        debug!(
            strategy = self.searcher.name(),
            limit,
            hits = results.len(),
            "retrieval finished"
        );
        Ok(results)
    }

    pub fn strategy(&self) -> &'static str {
        self.searcher.name()
    }
}
