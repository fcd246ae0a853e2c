//! Core data models used throughout DocChat.
//!
//! These types represent the users, documents, chunks, and chat transcripts
//! that flow through the ingestion and chat pipelines. All types are
//! serializable so they can be returned directly from HTTP handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account.
///
/// The password hash never leaves the server; use [`UserProfile`] for
/// anything returned to a client.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Public view of a [`User`] (the `GET /auth/me` response shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            created_at: user.created_at,
        }
    }
}

/// Metadata for an uploaded PDF.
///
/// Created once ingestion finishes; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Opaque, globally unique identifier (UUID v4).
    pub id: String,
    /// Owning user; also the vector index namespace for this document.
    pub user_id: String,
    /// Filename as supplied by the uploader.
    pub filename: String,
    /// Where the raw bytes live on disk.
    pub file_path: String,
    pub upload_date: DateTime<Utc>,
    /// Number of chunks the extracted text was split into.
    pub chunk_count: i64,
    /// Number of chunks that were embedded and upserted successfully.
    pub indexed_chunks: i64,
}

/// A window of a document's extracted text.
///
/// Chunks are never stored on their own; each one becomes the payload of a
/// single vector index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub document_id: String,
    pub user_id: String,
    /// 0-based position within the document.
    pub chunk_index: i64,
    pub text: String,
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One persisted chat exchange.
///
/// Each exchange writes a fresh record holding the full transcript the
/// caller supplied plus the new user/assistant pair. Records are never
/// amended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatHistory {
    pub id: String,
    pub user_id: String,
    pub document_id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}
