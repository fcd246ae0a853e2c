//! Document ingestion: store → extract → chunk → embed → upsert → record.
//!
//! ```text
//! upload(filename, bytes)
//!   │  reject non-.pdf names before touching disk
//!   ▼
//! {uploads_dir}/{document_id}_{filename}
//!   │  extract text (blocking thread); on failure remove the file
//!   ▼
//! chunk_text(window, overlap)
//!   │  per chunk: embed → upsert into namespace = user_id
//!   │  failures are logged and skipped
//!   ▼
//! Document { chunk_count: attempted, indexed_chunks: succeeded }
//! ```

use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use docchat_core::chunk::{chunk_text, truncate_chars, ChunkParams};
use docchat_core::index::{entry_id, ChunkMetadata, IndexEntry};
use docchat_core::models::Document;

use crate::config::Config;
use crate::extract::{extract_pdf, is_pdf_filename, ExtractError};
use crate::services::Services;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Only PDF files are supported")]
    UnsupportedFormat,
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Ingestion settings resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub uploads_dir: PathBuf,
    pub params: ChunkParams,
    pub metadata_text_cap: usize,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            uploads_dir: config.storage.uploads_dir.clone(),
            params: config.chunking.params()?,
            metadata_text_cap: config.chunking.metadata_text_cap,
        })
    }
}

/// Strip any directory components a client may have put in the name.
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
}

/// Ingest one uploaded PDF for `user_id` and return its metadata record.
pub async fn ingest_pdf(
    services: &Services,
    settings: &IngestSettings,
    user_id: &str,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<Document, IngestError> {
    let filename = base_name(filename);
    if !is_pdf_filename(filename) {
        return Err(IngestError::UnsupportedFormat);
    }

    let document_id = uuid::Uuid::new_v4().to_string();
    let file_path = settings
        .uploads_dir
        .join(format!("{}_{}", document_id, filename));

    tokio::fs::create_dir_all(&settings.uploads_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.uploads_dir.display()))?;
    tokio::fs::write(&file_path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", file_path.display()))?;

    let extracted = match tokio::task::spawn_blocking(move || extract_pdf(&bytes)).await {
        Ok(result) => result,
        Err(e) => {
            warn!(document_id = %document_id, error = %e, "PDF extraction task aborted");
            Err(ExtractError::Pdf("PDF parser panicked".to_string()))
        }
    };
    let text = match extracted {
        Ok(text) => text,
        Err(e) => {
            warn!(document_id = %document_id, user_id, error = %e, "PDF extraction failed");
            remove_upload(&file_path).await;
            return Err(e.into());
        }
    };

    let chunks = chunk_text(&document_id, user_id, &text, &settings.params);
    let mut indexed = 0i64;

    for chunk in &chunks {
        let vector = match services.embedder.embed(&chunk.text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(document_id = %document_id, chunk = chunk.chunk_index, error = %e, "embedding failed; skipping chunk");
                continue;
            }
        };

        let entry = IndexEntry {
            id: entry_id(&document_id, chunk.chunk_index),
            vector,
            metadata: ChunkMetadata {
                document_id: document_id.clone(),
                user_id: user_id.to_string(),
                chunk_number: chunk.chunk_index,
                text: truncate_chars(&chunk.text, settings.metadata_text_cap).to_string(),
            },
        };
        if let Err(e) = services.index.upsert(user_id, entry).await {
            warn!(document_id = %document_id, chunk = chunk.chunk_index, error = %e, "index upsert failed; skipping chunk");
            continue;
        }
        indexed += 1;
    }

    let doc = Document {
        id: document_id,
        user_id: user_id.to_string(),
        filename: filename.to_string(),
        file_path: file_path.display().to_string(),
        upload_date: Utc::now(),
        chunk_count: chunks.len() as i64,
        indexed_chunks: indexed,
    };
    services.store.insert_document(&doc).await?;

    info!(
        document_id = %doc.id,
        user_id,
        chunks = doc.chunk_count,
        indexed = doc.indexed_chunks,
        "ingested document"
    );
    Ok(doc)
}

/// Best-effort removal of a stored upload; a missing file is not an error.
pub(crate) async fn remove_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to delete file"),
    }
}
