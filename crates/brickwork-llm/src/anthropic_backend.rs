//! Anthropic Messages API transport

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use brickwork_config::ProviderConfig;
use brickwork_utils::error::LlmError;

use crate::http_client::{HttpClient, HttpParams};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Transport for Claude models through Anthropic's native API.
#[derive(Clone)]
pub struct AnthropicBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl AnthropicBackend {
    #[must_use]
    pub fn new(
        client: HttpClient,
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params,
        }
    }

    /// Build from a `[providers.anthropic]` section.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key variable is unset or
    /// no default model is given.
    pub fn from_provider_config(
        client: HttpClient,
        config: Option<&ProviderConfig>,
        default_model: &str,
    ) -> Result<Self, LlmError> {
        let api_key_env = config
            .and_then(|c| c.api_key_env.as_deref())
            .unwrap_or(DEFAULT_API_KEY_ENV);

        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "Anthropic API key not found in environment variable '{}'. \
                 Set this variable or configure a different api_key_env in [providers.anthropic].",
                api_key_env
            ))
        })?;

        if default_model.is_empty() {
            return Err(LlmError::Misconfiguration(
                "Anthropic endpoint has no model configured".to_string(),
            ));
        }

        let defaults = HttpParams::default();
        let params = HttpParams {
            max_tokens: config
                .and_then(|c| c.max_tokens)
                .unwrap_or(defaults.max_tokens),
            temperature: config
                .and_then(|c| c.temperature)
                .unwrap_or(defaults.temperature),
        };

        Ok(Self::new(
            client,
            api_key,
            config.and_then(|c| c.base_url.clone()),
            default_model.to_string(),
            params,
        ))
    }

    fn resolve_params(&self, inv: &LlmInvocation) -> (String, HttpParams) {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };
        (model, self.default_params.resolve(&inv.metadata))
    }

    /// Anthropic takes system prompts in a separate field.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut anthropic_messages = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    if let Some(existing) = system_prompt.as_mut() {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    } else {
                        system_prompt = Some(msg.content.clone());
                    }
                }
                Role::User => anthropic_messages.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: msg.content.clone(),
                }),
                Role::Assistant => anthropic_messages.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, anthropic_messages)
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.resolve_params(&inv);

        debug!(
            provider = "anthropic",
            request = %inv.request_label,
            model = %model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let (system, messages) = Self::convert_messages(&inv.messages);
        let body = AnthropicRequest {
            model: model.clone(),
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system,
        };

        let request = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response = self.client.send(request, inv.timeout, "anthropic").await?;

        let response_body: AnthropicResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse Anthropic response: {}", e))
        })?;

        let content: String = response_body
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() {
            return Err(LlmError::Transport(
                "Anthropic response missing text content".to_string(),
            ));
        }

        let mut result = LlmResult::new(content, "anthropic", model);
        if let Some(usage) = response_body.usage {
            result = result.with_tokens(usage.input_tokens, usage.output_tokens);
        }

        debug!(
            provider = "anthropic",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Anthropic invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn backend() -> AnthropicBackend {
        AnthropicBackend::new(
            HttpClient::new().unwrap(),
            "test-key".to_string(),
            None,
            "default-model".to_string(),
            HttpParams {
                max_tokens: 1024,
                temperature: 0.5,
            },
        )
    }

    #[test]
    fn test_resolve_params_uses_defaults() {
        let inv = LlmInvocation::new("t", "", Duration::from_secs(60), vec![]);
        let (model, params) = backend().resolve_params(&inv);
        assert_eq!(model, "default-model");
        assert_eq!(params.max_tokens, 1024);
        assert_eq!(params.temperature, 0.5);
    }

    #[test]
    fn test_resolve_params_prefers_invocation_model() {
        let inv = LlmInvocation::new("t", "claude-haiku", Duration::from_secs(60), vec![]);
        let (model, _) = backend().resolve_params(&inv);
        assert_eq!(model, "claude-haiku");
    }

    #[test]
    fn test_convert_messages_separates_system() {
        let messages = vec![
            Message::system("You are a hostile auditor"),
            Message::system("Cite evidence"),
            Message::user("Audit this"),
            Message::assistant("Verdict follows"),
        ];

        let (system, converted) = AnthropicBackend::convert_messages(&messages);

        assert_eq!(
            system.as_deref(),
            Some("You are a hostile auditor\n\nCite evidence")
        );
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[1].role, "assistant");
    }

    #[test]
    fn test_response_parsing_joins_text_blocks() {
        let body = r#"{
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "world"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 5}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed
            .content
            .iter()
            .filter(|b| b.content_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        assert_eq!(text, "Hello world");
        assert_eq!(parsed.usage.unwrap().output_tokens, 5);
    }

    #[test]
    fn test_missing_api_key_is_misconfiguration() {
        let config = ProviderConfig {
            api_key_env: Some("BRICKWORK_TEST_UNSET_ANTHROPIC_KEY".to_string()),
            ..ProviderConfig::default()
        };
        let result = AnthropicBackend::from_provider_config(
            HttpClient::new().unwrap(),
            Some(&config),
            "claude",
        );
        match result {
            Err(LlmError::Misconfiguration(msg)) => {
                assert!(msg.contains("BRICKWORK_TEST_UNSET_ANTHROPIC_KEY"));
            }
            Err(other) => panic!("Expected Misconfiguration, got {other:?}"),
            Ok(_) => panic!("Expected Misconfiguration, got a backend"),
        }
    }
}
