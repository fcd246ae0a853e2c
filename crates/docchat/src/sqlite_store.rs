//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the `users`, `documents`, and
//! `chat_history` tables created by [`crate::migrate`]. Timestamps are
//! written as RFC 3339 strings and parsed back into `DateTime<Utc>` on read.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docchat_core::models::{ChatHistory, ChatMessage, Document, User};
use docchat_core::store::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp in database: {}", raw))?
        .with_timezone(&Utc))
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let created_at: String = row.get("created_at");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("hashed_password"),
        created_at: parse_ts(&created_at)?,
    })
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let upload_date: String = row.get("upload_date");
    Ok(Document {
        id: row.get("id"),
        user_id: row.get("user_id"),
        filename: row.get("filename"),
        file_path: row.get("file_path"),
        upload_date: parse_ts(&upload_date)?,
        chunk_count: row.get("chunk_count"),
        indexed_chunks: row.get("indexed_chunks"),
    })
}

fn history_from_row(row: &SqliteRow) -> Result<ChatHistory> {
    let messages_json: String = row.get("messages_json");
    let created_at: String = row.get("created_at");
    let messages: Vec<ChatMessage> =
        serde_json::from_str(&messages_json).context("invalid chat history messages")?;
    Ok(ChatHistory {
        id: row.get("id"),
        user_id: row.get("user_id"),
        document_id: row.get("document_id"),
        messages,
        created_at: parse_ts(&created_at)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_user(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, hashed_password, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, filename, file_path, upload_date,
                                   chunk_count, indexed_chunks)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.user_id)
        .bind(&doc.filename)
        .bind(&doc.file_path)
        .bind(doc.upload_date.to_rfc3339())
        .bind(doc.chunk_count)
        .bind(doc.indexed_chunks)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_document(&self, id: &str, user_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE user_id = ? ORDER BY upload_date ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_chat_history(&self, record: &ChatHistory) -> Result<()> {
        let messages_json = serde_json::to_string(&record.messages)?;
        sqlx::query(
            r#"
            INSERT INTO chat_history (id, user_id, document_id, messages_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.document_id)
        .bind(messages_json)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_chat_history(
        &self,
        user_id: &str,
        document_id: &str,
    ) -> Result<Vec<ChatHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM chat_history
            WHERE user_id = ? AND document_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(user_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }
}
