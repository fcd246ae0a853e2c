//! Local [`VectorIndex`] on SQLite.
//!
//! Vectors are stored as little-endian f32 BLOBs in the `vectors` table,
//! keyed by `(namespace, id)`. Queries load the namespace's rows for the
//! filtered document and rank them by cosine similarity in process, which
//! is fine at the scale of one user's document.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use docchat_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use docchat_core::index::{
    check_namespace, rank_matches, ChunkMetadata, IndexEntry, IndexError, IndexMatch,
    MetadataFilter, VectorIndex,
};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> IndexError {
    IndexError::Backend(err.to_string())
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, namespace: &str, entry: IndexEntry) -> Result<(), IndexError> {
        check_namespace(namespace, &entry)?;
        sqlx::query(
            r#"
            INSERT INTO vectors (namespace, id, document_id, user_id, chunk_number, text, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(namespace, id) DO UPDATE SET
                document_id = excluded.document_id,
                user_id = excluded.user_id,
                chunk_number = excluded.chunk_number,
                text = excluded.text,
                embedding = excluded.embedding
            "#,
        )
        .bind(namespace)
        .bind(&entry.id)
        .bind(&entry.metadata.document_id)
        .bind(&entry.metadata.user_id)
        .bind(entry.metadata.chunk_number)
        .bind(&entry.metadata.text)
        .bind(vec_to_blob(&entry.vector))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, user_id, chunk_number, text, embedding
            FROM vectors
            WHERE namespace = ? AND document_id = ?
            "#,
        )
        .bind(namespace)
        .bind(&filter.document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let matches = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexMatch {
                    id: row.get("id"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                    metadata: ChunkMetadata {
                        document_id: row.get("document_id"),
                        user_id: row.get("user_id"),
                        chunk_number: row.get("chunk_number"),
                        text: row.get("text"),
                    },
                }
            })
            .collect();

        Ok(rank_matches(matches, top_k))
    }

    async fn delete(&self, namespace: &str, filter: &MetadataFilter) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM vectors WHERE namespace = ? AND document_id = ?")
            .bind(namespace)
            .bind(&filter.document_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
