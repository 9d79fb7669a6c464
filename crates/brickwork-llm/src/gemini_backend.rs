//! Google Gemini `generateContent` transport

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use brickwork_config::ProviderConfig;
use brickwork_utils::error::LlmError;

use crate::http_client::{HttpClient, HttpParams};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Clone)]
pub struct GeminiBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl GeminiBackend {
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
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            default_model,
            default_params,
        }
    }

    /// Build from a `[providers.gemini]` section.
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
                "Gemini API key not found in environment variable '{}'. \
                 Set this variable or configure a different api_key_env in [providers.gemini].",
                api_key_env
            ))
        })?;

        if default_model.is_empty() {
            return Err(LlmError::Misconfiguration(
                "Gemini endpoint has no model configured".to_string(),
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

    fn endpoint_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// Gemini uses `model` for the assistant role and a separate system instruction.
    fn convert_messages(messages: &[Message]) -> (Option<GeminiContent>, Vec<GeminiContent>) {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for msg in messages {
            let part = GeminiPart {
                text: msg.content.clone(),
            };
            match msg.role {
                Role::System => system_parts.push(part),
                Role::User => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![part],
                }),
                Role::Assistant => contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    parts: vec![part],
                }),
            }
        }

        let system = (!system_parts.is_empty()).then(|| GeminiContent {
            role: None,
            parts: system_parts,
        });
        (system, contents)
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };
        let params = self.default_params.resolve(&inv.metadata);

        debug!(
            provider = "gemini",
            request = %inv.request_label,
            model = %model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            "Invoking Gemini backend"
        );

        let (system_instruction, contents) = Self::convert_messages(&inv.messages);
        let body = GenerateRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            },
        };

        let request = self
            .client
            .post(&self.endpoint_url(&model))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body);

        let response = self.client.send(request, inv.timeout, "gemini").await?;

        let response_body: GenerateResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse Gemini response: {}", e))
        })?;

        let content: String = response_body
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::Transport(
                "Gemini response missing text content".to_string(),
            ));
        }

        let mut result = LlmResult::new(content, "gemini", model);
        if let Some(usage) = response_body.usage_metadata {
            result.tokens_input = usage.prompt_token_count;
            result.tokens_output = usage.candidates_token_count;
        }

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}
