//! Retrieval-augmented chat pipeline.
//!
//! [`start_chat`] runs the synchronous front half of a request (ownership
//! check, query embedding, retrieval, prompt assembly) and returns an error
//! directly if any of it fails. Only then is the generation producer
//! spawned, and from that point every outcome is reported in-band on the
//! returned [`ChatStream`]:
//!
//! ```text
//! {content} {content} ... {done}      generation finished, history persisted
//! {content} ... {error}               generation failed, nothing persisted
//! ```
//!
//! The producer hands events over a channel of capacity one, so at most one
//! event is buffered ahead of the consumer. If the consumer goes away the
//! next send fails; the producer stops reading from the model and the
//! partial transcript is dropped.

use chrono::Utc;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use docchat_core::chat::{build_prompt, transcript, ChatEvent, PromptMode};
use docchat_core::embedding::EmbeddingError;
use docchat_core::index::{IndexError, MetadataFilter};
use docchat_core::models::{ChatHistory, ChatMessage};
use docchat_core::store::Store;

use crate::config::Config;
use crate::generation::ChatModel;
use crate::services::Services;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub document_id: String,
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Document not found")]
    NotFound,
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Search failed: {0}")]
    Search(#[from] IndexError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct ChatSettings {
    pub top_k: usize,
    pub history_window: usize,
}

impl ChatSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            history_window: config.retrieval.history_window,
        }
    }
}

/// Content events followed by exactly one terminal event.
pub type ChatStream = BoxStream<'static, ChatEvent>;

/// Answer `request` for `user_id`, streaming the response.
pub async fn start_chat(
    services: &Services,
    settings: &ChatSettings,
    user_id: &str,
    request: ChatRequest,
) -> Result<ChatStream, ChatError> {
    services
        .store
        .find_document(&request.document_id, user_id)
        .await?
        .ok_or(ChatError::NotFound)?;

    let query = services.embedder.embed(&request.message).await?;
    let matches = services
        .index
        .query(
            user_id,
            &query,
            &MetadataFilter::document(&request.document_id),
            settings.top_k,
        )
        .await?;

    let plan = build_prompt(
        &matches,
        &request.conversation_history,
        &request.message,
        settings.history_window,
    );
    match plan.mode {
        PromptMode::Fallback => info!(
            user_id,
            document_id = %request.document_id,
            "no matching content; answering in fallback mode"
        ),
        PromptMode::Grounded => info!(
            user_id,
            document_id = %request.document_id,
            matches = matches.len(),
            context_chars = plan.context.chars().count(),
            "answering from document context"
        ),
    }

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(produce(
        services.store.clone(),
        services.chat_model.clone(),
        user_id.to_string(),
        request,
        plan.messages,
        tx,
    ));

    Ok(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .boxed())
}

/// Drive generation and report every outcome on `tx`.
async fn produce(
    store: Arc<dyn Store>,
    chat_model: Arc<dyn ChatModel>,
    user_id: String,
    request: ChatRequest,
    messages: Vec<ChatMessage>,
    tx: mpsc::Sender<ChatEvent>,
) {
    let document_id = request.document_id.as_str();

    debug!(
        user_id = %user_id,
        document_id,
        model = chat_model.model_name(),
        messages = messages.len(),
        "starting generation"
    );
    let mut tokens = match chat_model.stream_chat(&messages).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(user_id = %user_id, document_id, error = %e, "chat generation failed to start");
            let _ = tx.send(ChatEvent::error(e.to_string())).await;
            return;
        }
    };

    let mut response = String::new();
    while let Some(item) = tokens.next().await {
        match item {
            Ok(fragment) => {
                response.push_str(&fragment);
                if tx.send(ChatEvent::content(fragment)).await.is_err() {
                    info!(user_id = %user_id, document_id, "client disconnected; discarding response");
                    return;
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, document_id, error = %e, "chat generation failed mid-stream");
                let _ = tx.send(ChatEvent::error(e.to_string())).await;
                return;
            }
        }
    }

    let record = ChatHistory {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.clone(),
        document_id: request.document_id.clone(),
        messages: transcript(
            &request.conversation_history,
            &request.message,
            &response,
        ),
        created_at: Utc::now(),
    };
    if let Err(e) = store.insert_chat_history(&record).await {
        warn!(user_id = %user_id, document_id, error = %e, "failed to persist chat history");
    }

    let _ = tx.send(ChatEvent::done()).await;
}
