//! Concrete blocking provider implementations
//!
//! Both providers speak HTTP + SSE through `reqwest::blocking`. The blocking
//! client owns an internal runtime, so it is built per call on the bridge
//! worker thread and never created or dropped on the async side.

#[cfg(feature = "chat")]
pub mod chat;
#[cfg(feature = "responses")]
pub mod responses;
pub mod sse;

#[cfg(feature = "chat")]
pub use chat::{ChatConfig, ChatProvider};
#[cfg(feature = "responses")]
pub use responses::{ResponsesConfig, ResponsesProvider};
pub use sse::SseEvents;

use crate::{LLMError, Result};
use std::time::Duration;

/// Build a blocking HTTP client. Call only from a worker thread.
fn blocking_client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Map a non-success HTTP status to an error
fn status_error(status: reqwest::StatusCode, body: String, model: &str) -> LLMError {
    match status.as_u16() {
        401 => LLMError::AuthenticationFailed,
        429 => LLMError::RateLimitExceeded(body),
        400 => LLMError::InvalidRequest(body),
        404 => LLMError::ModelNotFound(model.to_string()),
        _ => LLMError::RequestFailed(format!("HTTP {status}: {body}")),
    }
}

/// Read an API key from the environment
fn env_key(var: &str) -> Result<String> {
    std::env::var(var)
        .map_err(|_| LLMError::ConfigurationError(format!("{var} environment variable not set")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new(), "m"),
            LLMError::AuthenticationFailed
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow".into(), "m"),
            LLMError::RateLimitExceeded(ref b) if b == "slow"
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new(), "gpt-5"),
            LLMError::ModelNotFound(ref m) if m == "gpt-5"
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream".into(), "m"),
            LLMError::RequestFailed(ref msg) if msg.contains("502")
        ));
    }
}
