//! HTTP retry with exponential backoff.
//!
//! Shared by every outbound provider (embeddings, Pinecone, the initial
//! chat completion request):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Why a request ultimately failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    /// Connection error or timeout on the final attempt.
    Network(String),
    /// Non-success status, either non-retryable or on the final attempt.
    Status { status: u16, body: String },
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpFailure::Network(msg) => write!(f, "{}", msg),
            HttpFailure::Status { status, body } => write!(f, "HTTP {}: {}", status, body),
        }
    }
}

pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// Send the request built by `build` up to `max_retries + 1` times and
/// return the first successful response.
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed
/// by `send`.
pub async fn send_with_retry<F>(
    label: &str,
    max_retries: u32,
    mut build: F,
) -> Result<Response, HttpFailure>
where
    F: FnMut() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(label, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body = response.text().await.unwrap_or_default();
                let failure = HttpFailure::Status {
                    status: status.as_u16(),
                    body,
                };
                if is_retryable(status) {
                    warn!(label, attempt, status = status.as_u16(), "transient API error");
                    last_err = Some(failure);
                    continue;
                }
                return Err(failure);
            }
            Err(e) => {
                warn!(label, attempt, error = %e, "request failed");
                last_err = Some(HttpFailure::Network(e.to_string()));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| HttpFailure::Network(format!("{} failed after retries", label))))
}
