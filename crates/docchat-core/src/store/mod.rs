//! Storage abstraction for users, document metadata, and chat history.
//!
//! The [`Store`] trait covers the three persisted collections (`users`,
//! `documents`, `chat_history`) so the HTTP layer and pipelines can run
//! against SQLite in production and [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChatHistory, Document, User};

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_user`](Store::insert_user) | Create a user unless the username is taken |
/// | [`find_user`](Store::find_user) | Look up a user by id |
/// | [`find_user_by_username`](Store::find_user_by_username) | Look up a user by username |
/// | [`insert_document`](Store::insert_document) | Persist document metadata |
/// | [`find_document`](Store::find_document) | Fetch a document owned by a user |
/// | [`list_documents`](Store::list_documents) | All of a user's documents |
/// | [`delete_document`](Store::delete_document) | Remove a metadata record |
/// | [`insert_chat_history`](Store::insert_chat_history) | Append one chat exchange |
/// | [`list_chat_history`](Store::list_chat_history) | A user's exchanges for one document |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new user.
    ///
    /// Returns `false` without writing anything when the username is
    /// already taken.
    async fn insert_user(&self, user: &User) -> Result<bool>;

    async fn find_user(&self, id: &str) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn insert_document(&self, doc: &Document) -> Result<()>;

    /// Fetch a document only if it belongs to `user_id`.
    async fn find_document(&self, id: &str, user_id: &str) -> Result<Option<Document>>;

    /// All documents owned by `user_id`, oldest upload first.
    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>>;

    /// Delete a document's metadata record. Returns whether a record existed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    async fn insert_chat_history(&self, record: &ChatHistory) -> Result<()>;

    /// Chat exchanges for one of a user's documents, oldest first.
    async fn list_chat_history(&self, user_id: &str, document_id: &str)
        -> Result<Vec<ChatHistory>>;
}
