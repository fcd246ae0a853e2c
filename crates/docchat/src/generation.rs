//! Streaming chat completion providers.
//!
//! The [`ChatModel`] trait yields the assistant response as a stream of
//! text fragments. [`OpenAiChatModel`] talks to any OpenAI-compatible
//! `POST /chat/completions` endpoint with `stream: true` and decodes the
//! server-sent events it returns:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//! data: [DONE]
//! ```
//!
//! Only the initial request is retried. Once the first byte of the body has
//! arrived, any failure ends the stream with a [`GenerationError::Stream`].
//! Lines that are not `data:` events (keep-alive comments) and events whose
//! JSON cannot be parsed are skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use docchat_core::models::ChatMessage;

use crate::config::GenerationConfig;
use crate::retry::{send_with_retry, HttpFailure};

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("chat model is disabled")]
    Disabled,
    #[error("chat request failed: {0}")]
    Request(String),
    #[error("chat API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("chat stream interrupted: {0}")]
    Stream(String),
}

impl From<HttpFailure> for GenerationError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Network(msg) => GenerationError::Request(msg),
            HttpFailure::Status { status, body } => GenerationError::Status { status, body },
        }
    }
}

/// Response fragments in arrival order. Ends after the first `Err`.
pub type TokenStream = BoxStream<'static, Result<String, GenerationError>>;

/// A streaming chat completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Start generating a response to `messages`.
    ///
    /// An `Err` here means nothing was produced; failures after the stream
    /// has started arrive as an `Err` item.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, GenerationError>;
}

/// Placeholder used when `generation.provider = "disabled"`.
pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn stream_chat(&self, _messages: &[ChatMessage]) -> Result<TokenStream, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAiChatModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        // Bounds connecting and each body read, never the whole stream.
        let idle = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(idle)
            .read_timeout(idle)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        let response = send_with_retry("chat completion", self.max_retries, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()))
            .boxed();
        Ok(token_stream(bytes))
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
enum SseItem {
    Token(String),
    Done,
    Error(String),
}

/// Incremental decoder for an OpenAI-style completion event stream.
///
/// Bytes are buffered until a full line is available so events split
/// across network reads, or multi-byte characters split across them,
/// decode correctly.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseItem> {
        self.buffer.extend_from_slice(bytes);
        let mut items = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = parse_line(&String::from_utf8_lossy(&line)) {
                items.push(item);
            }
        }
        items
    }

    /// Decode whatever is left once the body has ended.
    fn finish(&mut self) -> Vec<SseItem> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn parse_line(line: &str) -> Option<SseItem> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(SseItem::Done);
    }

    let json: serde_json::Value = match serde_json::from_str(payload) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "skipping unparseable completion chunk");
            return None;
        }
    };

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(SseItem::Error(message));
    }

    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())?;
    if content.is_empty() {
        None
    } else {
        Some(SseItem::Token(content.to_string()))
    }
}

struct DecodeState {
    bytes: BoxStream<'static, std::result::Result<Vec<u8>, String>>,
    decoder: SseDecoder,
    pending: VecDeque<SseItem>,
    eof: bool,
    finished: bool,
}

/// Turn a raw completion body into a stream of content fragments.
fn token_stream(bytes: BoxStream<'static, std::result::Result<Vec<u8>, String>>) -> TokenStream {
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        eof: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            if let Some(item) = st.pending.pop_front() {
                match item {
                    SseItem::Token(text) => return Some((Ok(text), st)),
                    SseItem::Done => return None,
                    SseItem::Error(msg) => {
                        st.finished = true;
                        return Some((Err(GenerationError::Stream(msg)), st));
                    }
                }
            }
            if st.eof {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let items = st.decoder.push(&chunk);
                    st.pending.extend(items);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(GenerationError::Stream(e)), st));
                }
                None => {
                    st.eof = true;
                    let items = st.decoder.finish();
                    st.pending.extend(items);
                }
            }
        }
    })
    .boxed()
}

/// Build the chat model selected by `config.provider`.
pub fn create_chat_model(config: &GenerationConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "openai" => Ok(Arc::new(OpenAiChatModel::new(config)?)),
        other => bail!("Unknown generation provider: '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&str]) -> BoxStream<'static, std::result::Result<Vec<u8>, String>> {
        let owned: Vec<_> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned).boxed()
    }

    async fn collect(stream: TokenStream) -> Vec<Result<String, GenerationError>> {
        stream.collect().await
    }

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
        )
    }

    #[test]
    fn test_parse_line_variants() {
        assert_eq!(parse_line(&delta("hi")), Some(SseItem::Token("hi".into())));
        assert_eq!(parse_line("data: [DONE]"), Some(SseItem::Done));
        assert_eq!(parse_line(": OPENROUTER PROCESSING"), None);
        assert_eq!(parse_line("data: {not json"), None);
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
        assert_eq!(
            parse_line(r#"data: {"error":{"message":"overloaded"}}"#),
            Some(SseItem::Error("overloaded".into()))
        );
    }

    #[tokio::test]
    async fn test_tokens_in_order_until_done() {
        let first = delta("Hel");
        let second = delta("lo");
        let late = delta("late");
        let parts = [
            first.as_str(),
            second.as_str(),
            "data: [DONE]\n\n",
            late.as_str(),
        ];
        let out = collect(token_stream(body(&parts))).await;
        let tokens: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(tokens, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_event_split_across_reads() {
        let event = delta("split");
        let (a, b) = event.split_at(10);
        let out = collect(token_stream(body(&[a, b, "data: [DONE]\n"]))).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "split");
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_reads() {
        let event = delta("héllo");
        let bytes = event.as_bytes();
        let cut = event.find('é').unwrap() + 1;
        let parts: Vec<std::result::Result<Vec<u8>, String>> =
            vec![Ok(bytes[..cut].to_vec()), Ok(bytes[cut..].to_vec())];
        let out = collect(token_stream(stream::iter(parts).boxed())).await;
        assert_eq!(out[0].as_ref().unwrap(), "héllo");
    }

    #[tokio::test]
    async fn test_unterminated_final_event_is_flushed() {
        let last = delta("end");
        let out = collect(token_stream(body(&[last.trim_end()]))).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "end");
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(delta("partial").into_bytes()),
            Err("connection reset".to_string()),
            Ok(delta("never").into_bytes()),
        ];
        let out = collect(token_stream(stream::iter(parts).boxed())).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "partial");
        assert!(matches!(out[1], Err(GenerationError::Stream(_))));
    }

    #[tokio::test]
    async fn test_upstream_error_event_ends_stream() {
        let first = delta("a");
        let after = delta("b");
        let parts = [
            first.as_str(),
            "data: {\"error\":{\"message\":\"rate limited\"}}\n",
            after.as_str(),
        ];
        let out = collect(token_stream(body(&parts))).await;
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[1], Err(GenerationError::Stream(m)) if m == "rate limited"));
    }

    /// Serves a completion that trickles out `count` deltas `gap` apart.
    async fn slow_completion_server(count: usize, gap: Duration) -> String {
        use axum::body::Body;
        use axum::routing::post;
        use axum::Router;

        let app = Router::new().route(
            "/chat/completions",
            post(move || async move {
                let events = stream::unfold(0usize, move |i| async move {
                    if i > count {
                        return None;
                    }
                    if i > 0 {
                        tokio::time::sleep(gap).await;
                    }
                    let event = if i == count {
                        "data: [DONE]\n\n".to_string()
                    } else {
                        delta(&format!("t{}", i))
                    };
                    Some((Ok::<_, std::io::Error>(event), i + 1))
                });
                Body::from_stream(events)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_stream_may_outlast_timeout_while_tokens_flow() {
        let url = slow_completion_server(3, Duration::from_millis(700)).await;
        std::env::set_var("DOCCHAT_TEST_SLOW_STREAM_KEY", "k");
        let config = GenerationConfig {
            provider: "openai".into(),
            url,
            api_key_env: "DOCCHAT_TEST_SLOW_STREAM_KEY".into(),
            max_retries: 0,
            timeout_secs: 1,
            ..GenerationConfig::default()
        };
        let model = OpenAiChatModel::new(&config).unwrap();

        let tokens = model.stream_chat(&[ChatMessage::user("hi")]).await.unwrap();
        let out = collect(tokens).await;
        let out: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec!["t0", "t1", "t2"]);
    }

    #[tokio::test]
    async fn test_disabled_model_fails_before_streaming() {
        let model = create_chat_model(&GenerationConfig::default()).unwrap();
        assert!(matches!(
            model.stream_chat(&[ChatMessage::user("hi")]).await,
            Err(GenerationError::Disabled)
        ));
    }
}
