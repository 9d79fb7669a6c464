//! Shared HTTP client for the vendor transports
//!
//! One `reqwest::Client` is built per dispatcher and shared by every transport.
//! Each call performs exactly one attempt: failover and back-off belong to the
//! dispatcher and [`crate::RetryingBackend`], not to the transport.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use brickwork_utils::error::LlmError;
use brickwork_utils::redaction::{redact_error_message, truncate_for_error};

/// Default maximum HTTP timeout (5 minutes)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Default connect timeout (30 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies are truncated to this many characters
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Sampling parameters resolved for one call
#[derive(Debug, Clone, PartialEq)]
pub struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

impl HttpParams {
    /// Apply per-invocation overrides from `metadata["max_tokens"]` and
    /// `metadata["temperature"]`.
    #[must_use]
    pub fn resolve(&self, metadata: &std::collections::HashMap<String, serde_json::Value>) -> Self {
        let max_tokens = metadata
            .get("max_tokens")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(self.max_tokens);

        let temperature = metadata
            .get("temperature")
            .and_then(serde_json::Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(self.temperature);

        Self {
            max_tokens,
            temperature,
        }
    }
}

/// Shared HTTP client for LLM providers
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, LlmError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| {
                LlmError::Misconfiguration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
        })
    }

    /// Start a POST request on the shared connection pool.
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Execute a request once, mapping failure statuses to [`LlmError`].
    ///
    /// The effective timeout is `min(request_timeout, max_timeout)`.
    ///
    /// # Errors
    ///
    /// - `ProviderAuth` for 401/403
    /// - `NotFound` for 404
    /// - `ProviderQuota` for 429
    /// - `BadRequest` for other 4xx
    /// - `ProviderOutage` for 5xx
    /// - `Timeout` when the request times out
    /// - `Transport` for network errors
    pub async fn send(
        &self,
        request_builder: RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);

        let request = request_builder
            .timeout(effective_timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to build request: {}", e)))?;

        debug!(
            provider = provider_name,
            timeout_secs = effective_timeout.as_secs(),
            "Executing HTTP request"
        );

        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                let body = response.text().await.unwrap_or_default();
                Err(map_status(status, provider_name, &body))
            }
            Err(e) if e.is_timeout() => Err(LlmError::Timeout {
                duration: effective_timeout,
            }),
            Err(e) => Err(LlmError::Transport(format!(
                "{} request failed: {}",
                provider_name,
                redact_error_message(&e.to_string())
            ))),
        }
    }
}

/// Map a non-success HTTP status to an [`LlmError`] variant.
pub(crate) fn map_status(status: StatusCode, provider_name: &str, body: &str) -> LlmError {
    let detail = redact_error_message(&truncate_for_error(body.trim(), MAX_ERROR_BODY_CHARS));
    let message = if detail.is_empty() {
        format!("{} returned {}", provider_name, status)
    } else {
        format!("{} returned {}: {}", provider_name, status, detail)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::ProviderAuth(message),
        StatusCode::NOT_FOUND => LlmError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => LlmError::ProviderQuota(message),
        StatusCode::REQUEST_TIMEOUT => LlmError::Transport(message),
        s if s.is_server_error() => LlmError::ProviderOutage(message),
        _ => LlmError::BadRequest(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_http_client_creation() {
        assert!(HttpClient::new().is_ok());
    }

    #[test]
    fn test_map_status_auth() {
        match map_status(StatusCode::UNAUTHORIZED, "anthropic", "") {
            LlmError::ProviderAuth(msg) => {
                assert!(msg.contains("anthropic"));
                assert!(msg.contains("401"));
            }
            other => panic!("Expected ProviderAuth, got {other:?}"),
        }
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "openai", ""),
            LlmError::ProviderAuth(_)
        ));
    }

    #[test]
    fn test_map_status_transient_codes() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = map_status(status, "gemini", "");
            assert!(err.is_transient(), "{status} should be transient: {err:?}");
        }
    }

    #[test]
    fn test_map_status_bad_request_is_not_transient() {
        let err = map_status(
            StatusCode::BAD_REQUEST,
            "openai",
            r#"{"error":"context_length_exceeded"}"#,
        );
        match &err {
            LlmError::BadRequest(msg) => assert!(msg.contains("context_length_exceeded")),
            other => panic!("Expected BadRequest, got {other:?}"),
        }
        assert!(!err.warrants_failover());
        assert!(matches!(
            map_status(StatusCode::UNPROCESSABLE_ENTITY, "openai", ""),
            LlmError::BadRequest(_)
        ));
    }

    #[test]
    fn test_map_status_redacts_echoed_keys() {
        let err = map_status(
            StatusCode::UNAUTHORIZED,
            "openai",
            "invalid key sk-proj-abcdefghijklmnopqrstuvwxyz0123456789",
        );
        let msg = err.to_string();
        assert!(!msg.contains("abcdefghijklmnopqrstuvwxyz0123456789"));
        assert!(msg.contains("[REDACTED_KEY]"));
    }

    #[test]
    fn test_params_resolve_overrides() {
        let defaults = HttpParams {
            max_tokens: 1024,
            temperature: 0.5,
        };
        let mut metadata = HashMap::new();
        assert_eq!(defaults.resolve(&metadata), defaults);

        metadata.insert("temperature".to_string(), serde_json::json!(0.8));
        metadata.insert("max_tokens".to_string(), serde_json::json!(4096));
        let resolved = defaults.resolve(&metadata);
        assert_eq!(resolved.max_tokens, 4096);
        assert!((resolved.temperature - 0.8).abs() < f32::EPSILON);
    }
}
