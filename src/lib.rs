//! # forumrag: Forum Question Answering
//!
//! Answers questions about scraped forum posts: the question is embedded
//! locally, the most similar posts are pulled from a SQLite store, and one
//! chat-completion call turns them into an answer.
//!
//! ## Architecture
//!
//! - **[`config`]** - JSON configuration and API key resolution
//! - **[`store`]** - SQLite post store, optional sqlite-vec similarity
//! - **[`embedder`]** - Text embedding via ONNX Runtime (all-MiniLM-L6-v2) or feature hashing
//! - **[`search`]** - Native vs. scan similarity strategies
//! - **[`retriever`]** - Query embedding plus search
//! - **[`generator`]** - OpenAI-compatible chat-completion client
//! - **[`composer`]** - Prompt assembly and answer generation
//! - **[`query`]** - The facade: `ask`, `search`, `get_post`, `close`
//! - **[`ingest`]** - Loading scraper exports into the store
//! - **[`repl`]** - Interactive command loop

pub mod composer;
pub mod config;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod query;
pub mod repl;
pub mod retriever;
pub mod search;
pub mod store;

pub use error::{Error, Result};
pub use query::ForumQuerySystem;
