//! OpenAI-compatible chat completions transport
//!
//! Covers OpenAI itself, OpenRouter, and local servers (llama.cpp, Ollama,
//! vLLM) that expose `/v1/chat/completions`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use brickwork_config::ProviderConfig;
use brickwork_utils::error::LlmError;

use crate::http_client::{HttpClient, HttpParams};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    client: HttpClient,
    base_url: String,
    /// `None` for local servers that take no key
    api_key: Option<String>,
    default_model: String,
    default_params: HttpParams,
}

impl OpenAiCompatibleBackend {
    #[must_use]
    pub fn new(
        client: HttpClient,
        api_key: Option<String>,
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

    /// Build from a `[providers.openai]` section.
    ///
    /// A custom `base_url` without `api_key_env` is treated as a keyless local
    /// server.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if a required API key is missing or
    /// no default model is given.
    pub fn from_provider_config(
        client: HttpClient,
        config: Option<&ProviderConfig>,
        default_model: &str,
    ) -> Result<Self, LlmError> {
        let base_url = config.and_then(|c| c.base_url.clone());
        let explicit_env = config.and_then(|c| c.api_key_env.as_deref());

        let api_key = match (explicit_env, &base_url) {
            (None, Some(_)) => std::env::var(DEFAULT_API_KEY_ENV).ok(),
            (env, _) => {
                let env = env.unwrap_or(DEFAULT_API_KEY_ENV);
                Some(std::env::var(env).map_err(|_| {
                    LlmError::Misconfiguration(format!(
                        "OpenAI-compatible API key not found in environment variable '{}'. \
                         Set this variable or configure a different api_key_env in [providers.openai].",
                        env
                    ))
                })?)
            }
        };

        if default_model.is_empty() {
            return Err(LlmError::Misconfiguration(
                "OpenAI-compatible endpoint has no model configured".to_string(),
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
            base_url,
            default_model.to_string(),
            params,
        ))
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|msg| ChatMessage {
                role: match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };
        let params = self.default_params.resolve(&inv.metadata);

        debug!(
            provider = "openai",
            request = %inv.request_label,
            model = %model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            "Invoking OpenAI-compatible backend"
        );

        let body = ChatRequest {
            model: model.clone(),
            messages: Self::convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let mut request = self
            .client
            .post(&self.base_url)
            .header("content-type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = self.client.send(request, inv.timeout, "openai").await?;

        let response_body: ChatResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse chat completion response: {}", e))
        })?;

        let content = response_body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                LlmError::Transport("Chat completion response missing content".to_string())
            })?;

        let mut result = LlmResult::new(content, "openai", model);
        if let Some(usage) = response_body.usage {
            result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }

        debug!(
            provider = "openai",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "OpenAI-compatible invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_keeps_roles_in_order() {
        let converted = OpenAiCompatibleBackend::convert_messages(&[
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant("hello"),
        ]);
        let roles: Vec<&str> = converted.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }

    #[test]
    fn test_local_server_needs_no_key() {
        let config = ProviderConfig {
            base_url: Some("http://localhost:11434/v1/chat/completions".to_string()),
            ..ProviderConfig::default()
        };
        let backend = OpenAiCompatibleBackend::from_provider_config(
            HttpClient::new().unwrap(),
            Some(&config),
            "qwen2.5:7b",
        )
        .unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_explicit_key_env_is_required() {
        let config = ProviderConfig {
            api_key_env: Some("BRICKWORK_TEST_UNSET_OPENAI_KEY".to_string()),
            ..ProviderConfig::default()
        };
        let result = OpenAiCompatibleBackend::from_provider_config(
            HttpClient::new().unwrap(),
            Some(&config),
            "gpt-4o-mini",
        );
        assert!(matches!(result, Err(LlmError::Misconfiguration(_))));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "```yaml\nok: true\n```"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("```yaml\nok: true\n```")
        );
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 9);
    }
}
