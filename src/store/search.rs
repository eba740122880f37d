use super::posts::{POST_COLUMNS, map_post_row};
use super::{SearchResult, SqliteStore, StoreError, serialize_vector};
use rusqlite::params;

/// Rows whose stored vector cannot be compared with a `?2`-dimensional
/// query (wrong length, JSON with non-numeric elements) are filtered out before sqlite-vec sees them, so a bad row makes
/// its post unsearchable instead of failing the whole query.
const VEC_SEARCH_SQL: &str = r#"
    SELECT
        {columns},
        COALESCE(vec_distance_cosine(e.embedding, ?1), 1.0) AS distance
    FROM forum_posts_embeddings e
    JOIN forum_posts_meta m ON m.id = e.id
    WHERE CASE typeof(e.embedding)
        WHEN 'blob' THEN length(e.embedding) = ?2 * 4
        WHEN 'text' THEN CASE
            WHEN json_valid(e.embedding) THEN json_array_length(e.embedding) = ?2
                AND NOT EXISTS (
                    SELECT 1 FROM json_each(e.embedding)
                    WHERE type NOT IN ('integer', 'real')
                )
            ELSE 0
        END
        ELSE 0
    END
    ORDER BY distance ASC, m.id ASC
    LIMIT ?3
"#;

impl SqliteStore {
    /// Rank posts by sqlite-vec cosine distance.
    ///
    /// A zero-norm vector yields no distance; it is scored as orthogonal
    /// (distance 1) to match the in-process scan.
    pub(crate) fn vec_search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        if limit == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let sql = VEC_SEARCH_SQL.replace("{columns}", POST_COLUMNS);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![
                serialize_vector(query),
                query.len() as i64,
                i64::try_from(limit).unwrap_or(i64::MAX)
            ],
            |row| {
                let distance: f64 = row.get(6)?;
                Ok(SearchResult {
                    post: map_post_row(row)?,
                    similarity: 1.0 - distance,
                })
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
