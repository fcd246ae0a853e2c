//! In-memory [`Store`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ChatHistory, Document, User};

use super::Store;

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<String, User>>,
    documents: RwLock<Vec<Document>>,
    chat_history: RwLock<Vec<ChatHistory>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every chat-history record, in insertion order.
    pub fn all_chat_history(&self) -> Vec<ChatHistory> {
        self.chat_history
            .read()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<bool> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.values().any(|u| u.username == user.username) {
            return Ok(false);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(true)
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.get(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        docs.retain(|d| d.id != doc.id);
        docs.push(doc.clone());
        Ok(())
    }

    async fn find_document(&self, id: &str, user_id: &str) -> Result<Option<Document>> {
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs
            .iter()
            .find(|d| d.id == id && d.user_id == user_id)
            .cloned())
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs.iter().filter(|d| d.user_id == user_id).cloned().collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        Ok(docs.len() != before)
    }

    async fn insert_chat_history(&self, record: &ChatHistory) -> Result<()> {
        self.chat_history
            .write()
            .map_err(poisoned)?
            .push(record.clone());
        Ok(())
    }

    async fn list_chat_history(
        &self,
        user_id: &str,
        document_id: &str,
    ) -> Result<Vec<ChatHistory>> {
        let history = self.chat_history.read().map_err(poisoned)?;
        Ok(history
            .iter()
            .filter(|h| h.user_id == user_id && h.document_id == document_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            username: name.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    fn doc(id: &str, owner: &str) -> Document {
        Document {
            id: id.to_string(),
            user_id: owner.to_string(),
            filename: format!("{}.pdf", id),
            file_path: format!("/tmp/{}.pdf", id),
            upload_date: Utc::now(),
            chunk_count: 2,
            indexed_chunks: 2,
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = InMemoryStore::new();
        assert!(store.insert_user(&user("1", "ada")).await.unwrap());
        assert!(!store.insert_user(&user("2", "ada")).await.unwrap());
        assert!(store.find_user("2").await.unwrap().is_none());
        assert_eq!(
            store.find_user_by_username("ada").await.unwrap().unwrap().id,
            "1"
        );
    }

    #[tokio::test]
    async fn test_documents_scoped_to_owner() {
        let store = InMemoryStore::new();
        store.insert_document(&doc("d1", "alice")).await.unwrap();
        store.insert_document(&doc("d2", "bob")).await.unwrap();

        assert!(store.find_document("d1", "alice").await.unwrap().is_some());
        assert!(store.find_document("d1", "bob").await.unwrap().is_none());
        assert_eq!(store.list_documents("alice").await.unwrap().len(), 1);

        assert!(store.delete_document("d1").await.unwrap());
        assert!(!store.delete_document("d1").await.unwrap());
        assert!(store.list_documents("alice").await.unwrap().is_empty());
    }
}
