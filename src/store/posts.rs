use super::{
    NewPost, Post, PostStore, SearchResult, SqliteStore, StoreCapabilities, StoreError,
    deserialize_vector, serialize_vector,
};
use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, warn};

pub(crate) const POST_COLUMNS: &str = "m.id, m.source, m.author, m.date, m.text, m.comment_id";

/// Map the six `POST_COLUMNS` starting at index 0.
pub(crate) fn map_post_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        source: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        author: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "Unknown".to_string()),
        date: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        text: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        comment_id: row
            .get::<_, Option<String>>(5)?
            .filter(|c| !c.is_empty()),
    })
}

impl PostStore for SqliteStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            native_similarity: self.native,
        }
    }

    fn get_post(&self, id: i64) -> Result<Option<Post>, StoreError> {
        let post = self
            .conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM forum_posts_meta m WHERE m.id = ?"),
                params![id],
                map_post_row,
            )
            .optional()?;
        Ok(post)
    }

    fn get_posts(&self, ids: &[i64]) -> Result<Vec<Post>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {POST_COLUMNS} FROM forum_posts_meta m WHERE m.id = ?"
        ))?;

        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(post) = stmt.query_row(params![id], map_post_row).optional()? {
                posts.push(post);
            }
        }
        Ok(posts)
    }

    fn embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT e.id, e.embedding FROM forum_posts_embeddings e \
                 JOIN forum_posts_meta m ON m.id = e.id ORDER BY e.id ASC",
            )?;
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            match deserialize_vector(row.get_ref(1)?) {
                Some(vec) => out.push((id, vec)),
                None => warn!(post_id = id, "unreadable embedding, post is unsearchable"),
            }
        }
        debug!(count = out.len(), "loaded embeddings");
        Ok(out)
    }

    fn native_search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        if !self.native {
            return Err(StoreError::NativeUnavailable);
        }
        self.vec_search(query, limit)
    }

    fn post_count(&self) -> Result<usize, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM forum_posts_meta", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

impl SqliteStore {
    /// Insert a post and its embedding in one transaction, returning the new id.
    ///
    /// Only ingestion writes; the query side opens the store read-only.
    pub fn insert_post(&mut self, post: &NewPost<'_>, embedding: &[f32]) -> Result<i64, StoreError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO forum_posts_meta (source, author, date, text, comment_id) VALUES (?, ?, ?, ?, ?)",
            params![post.source, post.author, post.date, post.text, post.comment_id],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO forum_posts_embeddings (id, embedding) VALUES (?, ?)",
            params![id, serialize_vector(embedding)],
        )?;

        tx.commit()?;
        Ok(id)
    }

    /// Insert post metadata only. The post stays unsearchable until an
    /// embedding is added.
    pub fn insert_post_without_embedding(&mut self, post: &NewPost<'_>) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO forum_posts_meta (source, author, date, text, comment_id) VALUES (?, ?, ?, ?, ?)",
            params![post.source, post.author, post.date, post.text, post.comment_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_post(text: &str) -> NewPost<'_> {
        NewPost {
            source: "forums.iracing.com",
            author: "Jane Racer",
            date: "2024-02-01T10:00:00+00:00",
            text,
            comment_id: Some("Comment_123"),
        }
    }

    #[test]
    fn test_posts_crud() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        let a = store.insert_post(&new_post("first"), &[1.0, 0.0]).unwrap();
        let b = store.insert_post(&new_post("second"), &[0.0, 1.0]).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.post_count().unwrap(), 2);

        let post = store.get_post(a).unwrap().expect("post exists");
        assert_eq!(post.id, a);
        assert_eq!(post.text, "first");
        assert_eq!(post.author, "Jane Racer");
        assert_eq!(post.comment_id.as_deref(), Some("Comment_123"));

        assert!(store.get_post(9999).unwrap().is_none());

        let posts = store.get_posts(&[b, 9999, a]).unwrap();
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn test_embeddings_skip_unreadable() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let good = store.insert_post(&new_post("good"), &[0.5, 0.5]).unwrap();
        let bad = store.insert_post_without_embedding(&new_post("bad")).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO forum_posts_embeddings (id, embedding) VALUES (?, ?)",
                params![bad, vec![1u8, 2, 3]],
            )
            .unwrap();
        let legacy = store.insert_post_without_embedding(&new_post("json")).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO forum_posts_embeddings (id, embedding) VALUES (?, ?)",
                params![legacy, "[0.1, 0.2]"],
            )
            .unwrap();

        let embeddings = store.embeddings().unwrap();
        assert_eq!(embeddings, vec![(good, vec![0.5, 0.5]), (legacy, vec![0.1, 0.2])]);
    }

    #[test]
    fn test_missing_author_defaults() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO forum_posts_meta (id, text) VALUES (7, 'hi')", [])
            .unwrap();
        let post = store.get_post(7).unwrap().unwrap();
        assert_eq!(post.author, "Unknown");
        assert_eq!(post.source, "");
        assert!(post.comment_id.is_none());
    }

    #[test]
    fn test_close() {
        let store: Box<dyn PostStore> = Box::new(SqliteStore::open_in_memory().unwrap());
        assert!(store.close().is_ok());
    }
}
