//! Namespaced vector index abstraction.
//!
//! The [`VectorIndex`] trait is the seam between the pipelines and whatever
//! nearest-neighbour store backs them (SQLite, Pinecone, in-memory).
//!
//! Every operation is scoped to a namespace, and the namespace is always the
//! owning user's id. That scoping is the only isolation between users'
//! data: implementations must never return or delete entries outside the
//! namespace they were given.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorIndex::upsert) | Insert or overwrite an entry by id |
//! | [`query`](VectorIndex::query) | Top-k cosine matches, filtered by document |
//! | [`delete`](VectorIndex::delete) | Remove every entry matching a filter |

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index operation failure. Failed operations leave the index unchanged.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("vector index request failed: {0}")]
    Request(String),
    #[error("vector index API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed vector index response: {0}")]
    MalformedResponse(String),
    #[error("vector index backend error: {0}")]
    Backend(String),
    #[error("entry owned by '{owner}' cannot be written to namespace '{namespace}'")]
    NamespaceMismatch { namespace: String, owner: String },
}

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub document_id: String,
    /// Always equal to the namespace the entry lives in.
    pub user_id: String,
    pub chunk_number: i64,
    /// Chunk text, truncated to the configured cap.
    pub text: String,
}

/// One entry to be written to the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// `{document_id}#chunk_{n}`; see [`entry_id`].
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A query hit, ordered by descending `score`.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Equality filter on entry metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub document_id: String,
}

impl MetadataFilter {
    pub fn document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        metadata.document_id == self.document_id
    }
}

/// Build the index entry id for chunk `index` of a document.
///
/// ```rust
/// assert_eq!(docchat_core::index::entry_id("doc-1", 3), "doc-1#chunk_3");
/// ```
pub fn entry_id(document_id: &str, index: i64) -> String {
    format!("{}#chunk_{}", document_id, index)
}

/// Reject an entry whose owner differs from the namespace it targets.
pub fn check_namespace(namespace: &str, entry: &IndexEntry) -> Result<(), IndexError> {
    if entry.metadata.user_id == namespace {
        Ok(())
    } else {
        Err(IndexError::NamespaceMismatch {
            namespace: namespace.to_string(),
            owner: entry.metadata.user_id.clone(),
        })
    }
}

/// Abstract nearest-neighbour store, namespaced by user id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite an entry. Idempotent on `entry.id`.
    ///
    /// Fails with [`IndexError::NamespaceMismatch`] unless
    /// `entry.metadata.user_id == namespace`.
    async fn upsert(&self, namespace: &str, entry: IndexEntry) -> Result<(), IndexError>;

    /// Return up to `top_k` entries in `namespace` matching `filter`, by
    /// descending cosine similarity to `vector`.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, IndexError>;

    /// Remove all entries in `namespace` matching `filter`.
    async fn delete(&self, namespace: &str, filter: &MetadataFilter) -> Result<(), IndexError>;
}

/// Sort matches by descending score and keep the first `top_k`.
pub fn rank_matches(mut matches: Vec<IndexMatch>, top_k: usize) -> Vec<IndexMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(top_k);
    matches
}
