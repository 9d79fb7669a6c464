//! Core types for the transport abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use brickwork_utils::error::LlmError;
use brickwork_utils::types::TokenUsage;

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Input to one transport call
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// Logical request name (e.g. `classify_domain`), used for logs and test routing
    pub request_label: String,
    /// Model to use; empty means the backend default
    pub model: String,
    pub timeout: Duration,
    pub messages: Vec<Message>,
    /// Provider-specific parameters (`temperature`, `max_tokens`)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        request_label: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            request_label: request_label.into(),
            model: model.into(),
            timeout,
            messages,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Concatenated content of all user messages.
    #[must_use]
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Result of one successful transport call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub raw_response: String,
    /// Transport name (e.g. "anthropic", "openai", "gemini")
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
    pub extensions: HashMap<String, serde_json::Value>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
            extensions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }

    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Token usage, if the provider reported any.
    #[must_use]
    pub fn token_usage(&self) -> Option<TokenUsage> {
        TokenUsage::from_counts(self.tokens_input, self.tokens_output)
    }
}

/// Minimal completion capability every vendor transport implements.
///
/// The dispatch core depends only on this trait, never on a concrete vendor
/// type. Implementations perform a single attempt and classify failures into
/// [`LlmError`] precisely enough for the dispatcher to tell transient errors
/// (429, 5xx, 404, network, timeout) from non-transient ones (400).
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// # Errors
    ///
    /// Returns `LlmError` for any failure during invocation.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_text_skips_system_messages() {
        let inv = LlmInvocation::new(
            "label",
            "",
            Duration::from_secs(1),
            vec![
                Message::system("be terse"),
                Message::user("first"),
                Message::assistant("ok"),
                Message::user("second"),
            ],
        );
        assert_eq!(inv.user_text(), "first\n\nsecond");
    }

    #[test]
    fn test_token_usage_only_when_reported() {
        let result = LlmResult::new("hi", "anthropic", "m");
        assert!(result.token_usage().is_none());
        let usage = result.with_tokens(3, 4).token_usage().unwrap();
        assert_eq!(usage.total(), 7);
    }
}
