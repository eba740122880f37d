//! Post store: forum posts plus one embedding per post.
//!
//! [`PostStore`] is the backend seam; [`SqliteStore`] is the SQLite
//! implementation with the sqlite-vec extension registered for native
//! cosine distance.
use std::path::Path;
use std::sync::Once;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use sqlite_vec::sqlite3_vec_init;
use thiserror::Error;
use tracing::{debug, info};

pub mod models;
pub mod posts;
pub mod search;

pub use models::{NewPost, Post, SearchResult};

pub const META_TABLE: &str = "forum_posts_meta";
pub const EMBEDDING_TABLE: &str = "forum_posts_embeddings";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS forum_posts_meta (
    id INTEGER PRIMARY KEY,
    source TEXT,
    author TEXT,
    date TEXT,
    text TEXT,
    comment_id TEXT
);

CREATE TABLE IF NOT EXISTS forum_posts_embeddings (
    id INTEGER PRIMARY KEY,
    embedding BLOB NOT NULL
);
"#;

/// Errors raised by a post store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("missing table `{0}`; was the database populated by the scraper?")]
    MissingTable(String),

    #[error("unsupported layout for table `{0}`: {1}")]
    UnsupportedLayout(String, String),

    #[error("native similarity search is not available on this store")]
    NativeUnavailable,
}

/// What a backend can do beyond plain reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// The backend can rank by cosine distance itself.
    pub native_similarity: bool,
}

/// Read side of a post store.
///
/// Implementations must return posts keyed by their stable id and must
/// skip, not fail on, posts that lack a usable embedding.
pub trait PostStore: Send {
    fn capabilities(&self) -> StoreCapabilities;

    /// Look up one post by id.
    fn get_post(&self, id: i64) -> Result<Option<Post>, StoreError>;

    /// Look up several posts in the order of `ids`; missing ids are skipped.
    fn get_posts(&self, ids: &[i64]) -> Result<Vec<Post>, StoreError>;

    /// Every stored `(post id, embedding)` pair, in ascending id order.
    fn embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>, StoreError>;

    /// Rank posts with the backend's own vector operator.
    ///
    /// Returns [`StoreError::NativeUnavailable`] when
    /// `capabilities().native_similarity` is false.
    fn native_search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError>;

    /// Number of posts, searchable or not.
    fn post_count(&self) -> Result<usize, StoreError>;

    /// Release the underlying connection.
    fn close(self: Box<Self>) -> Result<(), StoreError>;
}

static INIT_VEC: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards. Safe to call
/// multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// SQLite-backed post store.
pub struct SqliteStore {
    pub(crate) conn: Connection,
    native: bool,
}

impl SqliteStore {
    /// Open an existing database read-only. Both tables must already exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening post store: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        for table in [META_TABLE, EMBEDDING_TABLE] {
            if !table_exists(&conn, table)? {
                return Err(StoreError::MissingTable(table.to_string()));
            }
        }
        check_embedding_layout(&conn)?;

        Ok(Self::from_connection(conn))
    }

    /// Open (creating if needed) a writable database with the schema applied.
    /// Used by ingestion.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening post store for writing: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database with the schema applied (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        let native = probe_vec(&conn);
        Self { conn, native }
    }
}

/// Check whether sqlite-vec answers on this connection.
fn probe_vec(conn: &Connection) -> bool {
    match conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0)) {
        Ok(version) => {
            info!("sqlite-vec version: {}", version);
            true
        }
        Err(e) => {
            debug!("sqlite-vec not available: {e}");
            false
        }
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// The embedding table must be a plain table with `id` and `embedding`
/// columns. Virtual vector tables keyed by rowid (sqlite-vss, vec0) are
/// rejected up front.
fn check_embedding_layout(conn: &Connection) -> Result<(), StoreError> {
    let sql: String = conn.query_row(
        "SELECT COALESCE(sql, '') FROM sqlite_master WHERE name = ?",
        [EMBEDDING_TABLE],
        |row| row.get(0),
    )?;
    if sql.trim_start().to_ascii_uppercase().starts_with("CREATE VIRTUAL TABLE") {
        return Err(StoreError::UnsupportedLayout(
            EMBEDDING_TABLE.to_string(),
            "virtual vector tables are not supported; re-run ingestion into a plain table"
                .to_string(),
        ));
    }

    let columns: i64 = conn.query_row(
        "SELECT count(*) FROM pragma_table_info(?) WHERE name IN ('id', 'embedding')",
        [EMBEDDING_TABLE],
        |row| row.get(0),
    )?;
    if columns != 2 {
        return Err(StoreError::UnsupportedLayout(
            EMBEDDING_TABLE.to_string(),
            "expected `id` and `embedding` columns".to_string(),
        ));
    }
    Ok(())
}

/// Serialize a float32 vector into little-endian bytes.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a stored embedding.
///
/// Accepts the little-endian f32 blob written by ingestion and the JSON
/// array text some older scraper runs stored instead. Returns `None` for
/// anything else.
pub fn deserialize_vector(raw: ValueRef<'_>) -> Option<Vec<f32>> {
    match raw {
        ValueRef::Blob(bytes) if !bytes.is_empty() && bytes.len() % 4 == 0 => Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ValueRef::Text(text) => serde_json::from_slice::<Vec<f32>>(text)
            .ok()
            .filter(|v| !v.is_empty()),
        _ => None,
    }
}
