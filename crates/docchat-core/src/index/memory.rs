//! In-memory [`VectorIndex`] implementation for tests and single-process use.
//!
//! Entries live in a `HashMap` per namespace behind a `std::sync::RwLock`.
//! Queries are brute-force cosine similarity over the namespace.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{
    check_namespace, rank_matches, IndexEntry, IndexError, IndexMatch, MetadataFilter, VectorIndex,
};

type Namespaces = HashMap<String, HashMap<String, IndexEntry>>;

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    namespaces: RwLock<Namespaces>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries stored in `namespace`.
    pub fn len(&self, namespace: &str) -> usize {
        self.read()
            .map(|ns| ns.get(namespace).map_or(0, |entries| entries.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Namespaces>, IndexError> {
        self.namespaces
            .read()
            .map_err(|_| IndexError::Backend("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Namespaces>, IndexError> {
        self.namespaces
            .write()
            .map_err(|_| IndexError::Backend("index lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, namespace: &str, entry: IndexEntry) -> Result<(), IndexError> {
        check_namespace(namespace, &entry)?;
        self.write()?
            .entry(namespace.to_string())
            .or_default()
            .insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, IndexError> {
        let namespaces = self.read()?;
        let Some(entries) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };
        let matches = entries
            .values()
            .filter(|e| filter.matches(&e.metadata))
            .map(|e| IndexMatch {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();
        Ok(rank_matches(matches, top_k))
    }

    async fn delete(&self, namespace: &str, filter: &MetadataFilter) -> Result<(), IndexError> {
        if let Some(entries) = self.write()?.get_mut(namespace) {
            entries.retain(|_, e| !filter.matches(&e.metadata));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{entry_id, ChunkMetadata};

    fn entry(doc: &str, user: &str, n: i64, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: entry_id(doc, n),
            vector,
            metadata: ChunkMetadata {
                document_id: doc.to_string(),
                user_id: user.to_string(),
                chunk_number: n,
                text: format!("{} chunk {}", doc, n),
            },
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = InMemoryIndex::new();
        index.upsert("u1", entry("d1", "u1", 0, vec![1.0, 0.0])).await.unwrap();
        index.upsert("u1", entry("d1", "u1", 1, vec![0.7, 0.7])).await.unwrap();
        index.upsert("u1", entry("d1", "u1", 2, vec![0.0, 1.0])).await.unwrap();

        let hits = index
            .query("u1", &[1.0, 0.1], &MetadataFilter::document("d1"), 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "d1#chunk_0");
        assert_eq!(hits[1].id, "d1#chunk_1");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_upsert_rejects_foreign_owner() {
        let index = InMemoryIndex::new();
        let err = index
            .upsert("u1", entry("d1", "u2", 0, vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NamespaceMismatch { .. }));
        assert!(index.is_empty("u1"));
        assert!(index.is_empty("u2"));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = InMemoryIndex::new();
        index.upsert("u1", entry("d1", "u1", 0, vec![1.0])).await.unwrap();
        index.upsert("u1", entry("d1", "u1", 0, vec![1.0])).await.unwrap();
        assert_eq!(index.len("u1"), 1);
    }

    #[tokio::test]
    async fn test_filter_restricts_to_document() {
        let index = InMemoryIndex::new();
        index.upsert("u1", entry("d1", "u1", 0, vec![1.0])).await.unwrap();
        index.upsert("u1", entry("d2", "u1", 0, vec![1.0])).await.unwrap();

        let hits = index
            .query("u1", &[1.0], &MetadataFilter::document("d2"), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.document_id, "d2");
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let index = InMemoryIndex::new();
        index.upsert("alice", entry("same-doc", "alice", 0, vec![1.0])).await.unwrap();
        index.upsert("bob", entry("same-doc", "bob", 0, vec![1.0])).await.unwrap();

        let filter = MetadataFilter::document("same-doc");
        let alice = index.query("alice", &[1.0], &filter, 5).await.unwrap();
        let bob = index.query("bob", &[1.0], &filter, 5).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(bob.len(), 1);
        assert_eq!(alice[0].metadata.user_id, "alice");
        assert_eq!(bob[0].metadata.user_id, "bob");

        index.delete("alice", &filter).await.unwrap();
        assert!(index.is_empty("alice"));
        assert_eq!(index.len("bob"), 1);
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_empty() {
        let index = InMemoryIndex::new();
        let hits = index
            .query("nobody", &[1.0], &MetadataFilter::document("d"), 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
        index.delete("nobody", &MetadataFilter::document("d")).await.unwrap();
    }
}
