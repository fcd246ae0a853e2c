//! Document listing, deletion, and chat-history read-back.
//!
//! Deletion is a best-effort sequence of independent steps, not a
//! transaction. Index and file cleanup failures are logged and skipped; only
//! the final metadata delete can fail the request.

use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use docchat_core::index::MetadataFilter;
use docchat_core::models::{ChatHistory, Document};
use docchat_core::store::Store;

use crate::ingest::remove_upload;
use crate::services::Services;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Document not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub async fn list_documents(store: &dyn Store, user_id: &str) -> anyhow::Result<Vec<Document>> {
    store.list_documents(user_id).await
}

/// Delete a document owned by `user_id`: index entries, then the stored
/// file, then the metadata record.
pub async fn delete_document(
    services: &Services,
    user_id: &str,
    document_id: &str,
) -> Result<(), DocumentError> {
    let doc = services
        .store
        .find_document(document_id, user_id)
        .await?
        .ok_or(DocumentError::NotFound)?;

    if let Err(e) = services
        .index
        .delete(user_id, &MetadataFilter::document(&doc.id))
        .await
    {
        warn!(document_id, user_id, error = %e, "failed to delete from vector index");
    }

    remove_upload(Path::new(&doc.file_path)).await;

    services.store.delete_document(&doc.id).await?;
    info!(document_id, user_id, "deleted document");
    Ok(())
}

/// Chat-history records for a document the caller owns, oldest first.
pub async fn chat_history(
    store: &dyn Store,
    user_id: &str,
    document_id: &str,
) -> Result<Vec<ChatHistory>, DocumentError> {
    if store.find_document(document_id, user_id).await?.is_none() {
        return Err(DocumentError::NotFound);
    }
    Ok(store.list_chat_history(user_id, document_id).await?)
}
