//! The query facade: the only entry point the CLI talks to.
use std::path::Path;

use tracing::{info, warn};

use crate::composer::AnswerComposer;
use crate::config::{Config, EmbedderBackend, Settings};
use crate::embedder::Embedder;
use crate::embedder::hashing::HashingEmbedder;
use crate::embedder::onnx::OnnxEmbedder;
use crate::embedder::{EmbeddingError, download};
use crate::error::{Error, Result};
use crate::generator::ChatClient;
use crate::generator::openai::OpenAiChatClient;
use crate::retriever::Retriever;
use crate::search::select_searcher;
use crate::store::{Post, PostStore, SearchResult, SqliteStore};

/// Forum question answering over a read-only post store.
///
/// Owns the store connection. Call [`close`](Self::close) when done; it
/// consumes the facade so it cannot be used or closed again.
pub struct ForumQuerySystem {
    store: Box<dyn PostStore>,
    retriever: Retriever,
    composer: AnswerComposer,
    top_k: usize,
}

impl ForumQuerySystem {
    /// Build the production stack from resolved settings: SQLite store,
    /// configured embedder, OpenAI-compatible chat client.
    pub fn open(settings: &Settings) -> Result<Self> {
        let config = &settings.config;

        let db_path = Path::new(&config.db_path);
        if !db_path.exists() {
            return Err(Error::Configuration(format!(
                "database file not found: {}",
                db_path.display()
            )));
        }

        let store = SqliteStore::open(db_path)?;
        let embedder = build_embedder(config)?;
        let chat = OpenAiChatClient::new(settings.api_key.expose(), &config.generation)?;

        Ok(Self::from_parts(
            Box::new(store),
            embedder,
            Box::new(chat),
            config,
        ))
    }

    /// Assemble from arbitrary components. The similarity strategy is
    /// chosen here, once, from the store's capabilities.
    pub fn from_parts(
        store: Box<dyn PostStore>,
        embedder: Box<dyn Embedder>,
        chat: Box<dyn ChatClient>,
        config: &Config,
    ) -> Self {
        let searcher = select_searcher(config.search.strategy, store.as_ref());
        Self {
            retriever: Retriever::new(embedder, searcher),
            composer: AnswerComposer::new(chat, &config.prompt),
            top_k: config.search_top_k,
            store,
        }
    }

    /// Posts most similar to `query`, best first, at most `limit`.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.retriever.search(self.store.as_ref(), query, limit)
    }

    /// Answer `question` using the `top_k` most similar posts as context.
    pub fn ask(&self, question: &str) -> Result<String> {
        let results = self.search(question, self.top_k)?;
        info!(context_posts = results.len(), "asking chat model");
        Ok(self.composer.answer(question, &results)?)
    }

    /// Look up a post by id.
    pub fn get_post(&self, id: i64) -> Result<Post> {
        self.store.get_post(id)?.ok_or(Error::NotFound(id))
    }

    /// Number of stored posts.
    pub fn post_count(&self) -> Result<usize> {
        Ok(self.store.post_count()?)
    }

    /// Number of posts `ask` retrieves as context.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Name of the similarity strategy in use.
    pub fn strategy(&self) -> &'static str {
        self.retriever.strategy()
    }

    /// Release the store connection.
    pub fn close(self) -> Result<()> {
        self.store.close()?;
        Ok(())
    }
}

/// Instantiate the configured embedder, downloading model files if allowed.
pub fn build_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    let model = &config.model;
    match model.backend {
        EmbedderBackend::Hashing => {
            warn!("using hashing embedder; results only reflect shared words");
            Ok(Box::new(HashingEmbedder::new(model.dimensions)))
        }
        EmbedderBackend::Onnx => {
            let dir = Path::new(&model.dir);
            if !download::all_files_present(dir) {
                if !model.auto_download {
                    return Err(Error::Configuration(format!(
                        "embedding model {} not found in {} and auto_download is off",
                        model.name,
                        dir.display()
                    )));
                }
                download::download_model_files(dir)
                    .map_err(|e| EmbeddingError::ModelLoadFailed(format!("{e:#}")))?;
            }
            Ok(Box::new(OnnxEmbedder::new(dir, model.dimensions)?))
        }
    }
}
