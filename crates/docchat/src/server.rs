//! HTTP API server.
//!
//! Exposes accounts, document management, and streaming chat over a JSON
//! HTTP API for the browser client.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`    | `/api/` | | Liveness message |
//! | `POST`   | `/api/auth/register` | | Create account, returns token (201) |
//! | `POST`   | `/api/auth/login` | | Exchange credentials for a token |
//! | `GET`    | `/api/auth/me` | bearer | Current user profile |
//! | `POST`   | `/api/documents/upload` | bearer | Multipart `file` upload, PDF only (201) |
//! | `GET`    | `/api/documents` | bearer | Caller's documents |
//! | `DELETE` | `/api/documents/{id}` | bearer | Delete a document and its index entries |
//! | `POST`   | `/api/chat` | bearer | Server-sent event stream of the answer |
//! | `GET`    | `/api/chat/history/{document_id}` | bearer | Saved exchanges for a document |
//! | `GET`    | `/health` | | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Document not found" },
//!   "detail": "Document not found" }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_format` (400),
//! `unauthorized` (401), `not_found` (404), `payload_too_large` (413),
//! `extraction_failed` (500), `embedding_failed` (500), `search_failed` (500),
//! `internal` (500).
//!
//! # Chat stream
//!
//! `POST /api/chat` answers with `text/event-stream`. Each event's data is
//! one JSON object: `{"content": "..."}` fragments, then exactly one of
//! `{"done": true}` or `{"error": "..."}`. Failures before generation
//! starts (unknown document, embedding, search) are ordinary JSON errors.

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

use docchat_core::models::{ChatHistory, Document, UserProfile};

use crate::auth::{self, AuthError, TokenSigner};
use crate::chat::{start_chat, ChatError, ChatRequest, ChatSettings};
use crate::config::Config;
use crate::documents::{self, DocumentError};
use crate::ingest::{ingest_pdf, IngestError, IngestSettings};
use crate::services::Services;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    services: Services,
    signer: TokenSigner,
    ingest: Arc<IngestSettings>,
    chat: ChatSettings,
}

impl AppState {
    pub fn new(config: &Config, services: Services) -> anyhow::Result<Self> {
        let secret = config.auth.resolve_secret()?;
        Ok(Self {
            config: Arc::new(config.clone()),
            services,
            signer: TokenSigner::new(secret, config.auth.expiration_minutes),
            ingest: Arc::new(IngestSettings::from_config(config)?),
            chat: ChatSettings::from_config(config),
        })
    }
}

/// Starts the HTTP server with services built from configuration.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    run_server_with_services(config, services).await
}

/// Like [`run_server`], but with caller-provided collaborators.
pub async fn run_server_with_services(config: &Config, services: Services) -> anyhow::Result<()> {
    let state = AppState::new(config, services)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "DocChat API listening");
    serve(listener, state).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Build the full route table.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.server.max_upload_bytes;
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/api", get(handle_root))
        .route("/api/", get(handle_root))
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/me", get(handle_me))
        .route(
            "/api/documents/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/documents", get(handle_list_documents))
        .route("/api/documents/{id}", delete(handle_delete_document))
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/history/{document_id}", get(handle_chat_history))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    /// Same text as `error.message`, for clients that read `detail`.
    detail: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message.clone(),
            },
            detail: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "Internal server error",
    )
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UsernameTaken | AuthError::MissingCredentials => {
                bad_request(err.to_string())
            }
            AuthError::InvalidCredentials | AuthError::InvalidToken => {
                unauthorized(err.to_string())
            }
            AuthError::UserNotFound => not_found(err.to_string()),
            AuthError::Internal(e) => internal(e),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::UnsupportedFormat => {
                AppError::new(StatusCode::BAD_REQUEST, "unsupported_format", err.to_string())
            }
            IngestError::Extraction(e) => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "extraction_failed",
                e.to_string(),
            ),
            IngestError::Internal(e) => internal(e),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound => not_found(err.to_string()),
            DocumentError::Internal(e) => internal(e),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotFound => not_found(err.to_string()),
            ChatError::Embedding(ref e) => {
                error!(error = %e, "query embedding failed");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "embedding_failed",
                    "Embedding generation failed",
                )
            }
            ChatError::Search(ref e) => {
                error!(error = %e, "vector search failed");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "search_failed",
                    "Search failed",
                )
            }
            ChatError::Internal(e) => internal(e),
        }
    }
}

// ============ Authentication ============

/// The authenticated caller's user id, taken from the bearer token.
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| unauthorized("Not authenticated"))?;
        let claims = state.signer.verify(token.trim())?;
        Ok(AuthUser(claims.sub))
    }
}

// ============ GET /health, GET /api/ ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "DocChat API is running".to_string(),
    })
}

// ============ /api/auth ============

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

async fn handle_register(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    let token = auth::register(
        state.services.store.as_ref(),
        &state.signer,
        &body.username,
        &body.password,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(TokenResponse::bearer(token))))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = auth::login(
        state.services.store.as_ref(),
        &state.signer,
        &body.username,
        &body.password,
    )
    .await?;
    Ok(Json(TokenResponse::bearer(token)))
}

async fn handle_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserProfile>, AppError> {
    let user = auth::current_user(state.services.store.as_ref(), &user_id).await?;
    Ok(Json(UserProfile::from(&user)))
}

// ============ /api/documents ============

/// Handler for `POST /api/documents/upload`.
///
/// Reads the multipart field named `file` and runs the ingestion pipeline.
async fn handle_upload(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Document>), AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("Uploaded file has no filename"))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let doc = ingest_pdf(
            &state.services,
            &state.ingest,
            &user_id,
            &filename,
            bytes.to_vec(),
        )
        .await?;
        return Ok((StatusCode::CREATED, Json(doc)));
    }
    Err(bad_request("No file uploaded"))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    let status = err.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "bad_request"
    };
    AppError::new(status, code, err.body_text())
}

async fn handle_list_documents(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Document>>, AppError> {
    let docs = documents::list_documents(state.services.store.as_ref(), &user_id).await?;
    Ok(Json(docs))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    documents::delete_document(&state.services, &user_id, &id).await?;
    Ok(Json(MessageResponse {
        message: "Document deleted successfully".to_string(),
    }))
}

// ============ /api/chat ============

async fn handle_chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let events = start_chat(&state.services, &state.chat, &user_id, request).await?;
    Ok(Sse::new(
        events.map(|event| Event::default().json_data(event)),
    ))
}

async fn handle_chat_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(document_id): Path<String>,
) -> Result<Json<Vec<ChatHistory>>, AppError> {
    let history =
        documents::chat_history(state.services.store.as_ref(), &user_id, &document_id).await?;
    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::embedding::EmbeddingError;
    use docchat_core::index::IndexError;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn provider_failures_do_not_leak_upstream_detail() {
        let embedding = ChatError::Embedding(EmbeddingError::Status {
            status: 401,
            body: "invalid api key sk-live-123".into(),
        });
        let (status, body) = body_of(embedding.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "embedding_failed");
        assert_eq!(body["detail"], "Embedding generation failed");

        let search = ChatError::Search(IndexError::Backend("pinecone 500: stack trace".into()));
        let (status, body) = body_of(search.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "search_failed");
        assert_eq!(body["error"]["message"], "Search failed");
    }

    #[tokio::test]
    async fn not_found_and_unsupported_format_map_to_client_errors() {
        let (status, body) = body_of(ChatError::NotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Document not found");

        let (status, body) = body_of(IngestError::UnsupportedFormat.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "unsupported_format");
    }
}
