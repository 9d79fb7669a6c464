//! Hydra failover dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info, warn};

use brickwork_config::{Config, ProviderEndpoint};
use brickwork_utils::error::{DispatchError, LlmError};
use brickwork_utils::logging::dispatch_span;
use brickwork_utils::redaction::redact_error_message;
use brickwork_utils::types::TokenUsage;

use crate::anthropic_backend::AnthropicBackend;
use crate::extraction::{ExtractionResult, extract_structured};
use crate::gemini_backend::GeminiBackend;
use crate::http_client::HttpClient;
use crate::openai_backend::OpenAiCompatibleBackend;
use crate::penalty_box::PenaltyBox;
use crate::types::{LlmBackend, LlmInvocation, Message};

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// One logical completion request, independent of the endpoint that serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Logical name used in logs (e.g. `generate_tasks`)
    pub label: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-call timeout; the dispatcher default applies when `None`
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            system: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn to_invocation(&self, model: &str, timeout: Duration) -> LlmInvocation {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.prompt.clone()));

        let mut inv = LlmInvocation::new(self.label.clone(), model, timeout, messages);
        if let Some(temperature) = self.temperature {
            inv = inv.with_metadata("temperature", serde_json::json!(temperature));
        }
        if let Some(max_tokens) = self.max_tokens {
            inv = inv.with_metadata("max_tokens", serde_json::json!(max_tokens));
        }
        inv
    }
}

/// Produced by exactly one successful call per logical request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub text: String,
    pub provider_used: ProviderEndpoint,
    pub token_usage: Option<TokenUsage>,
}

/// A completion together with its Soft-Strict extraction.
#[derive(Debug, Clone)]
pub struct StructuredCompletion<T> {
    pub completion: CompletionResult,
    pub extraction: ExtractionResult<T>,
}

/// Emitted each time an endpoint is penalized and dispatch moves on.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub request_label: String,
    pub endpoint_id: String,
    /// 1-based position of this attempt within the dispatch
    pub attempt: usize,
    pub error: String,
    pub cooldown: Duration,
}

pub type RetryObserver = Arc<dyn Fn(&RetryEvent) + Send + Sync>;
pub type UsageObserver = Arc<dyn Fn(&ProviderEndpoint, &TokenUsage) + Send + Sync>;

/// Routes completion requests across an ordered endpoint list.
///
/// Endpoints are tried strictly in the caller's order. The first success wins;
/// there is no quorum and no parallel racing. A transient failure penalizes the
/// endpoint and moves on with no delay. A non-transient failure is returned
/// immediately without penalizing anything.
///
/// # Example
///
/// ```rust,no_run
/// use brickwork_config::Config;
/// use brickwork_llm::{CompletionRequest, Dispatcher, PenaltyBox};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let config = Config::discover()?;
/// let dispatcher = Dispatcher::from_config(&config, PenaltyBox::new())?;
/// let request = CompletionRequest::new("hello", "Say hello in YAML");
/// let result = dispatcher.dispatch(config.endpoints(), &request).await?;
/// println!("{} answered: {}", result.provider_used.id, result.text);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
    penalty_box: PenaltyBox,
    cooldown: Duration,
    default_timeout: Duration,
    retry_observer: Option<RetryObserver>,
    usage_observer: Option<UsageObserver>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&String> = self.backends.keys().collect();
        providers.sort();
        f.debug_struct("Dispatcher")
            .field("providers", &providers)
            .field("cooldown", &self.cooldown)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Empty dispatcher sharing the given penalty box.
    #[must_use]
    pub fn new(penalty_box: PenaltyBox) -> Self {
        Self {
            backends: HashMap::new(),
            penalty_box,
            cooldown: DEFAULT_COOLDOWN,
            default_timeout: DEFAULT_TIMEOUT,
            retry_observer: None,
            usage_observer: None,
        }
    }

    /// Build transports for every provider referenced by the configured endpoints.
    ///
    /// A provider whose transport cannot be built (typically a missing API key)
    /// is logged and left unregistered; its endpoints then fail over at dispatch
    /// time.
    ///
    /// # Errors
    ///
    /// Returns the construction error when endpoints are configured but no
    /// transport at all could be built.
    pub fn from_config(config: &Config, penalty_box: PenaltyBox) -> Result<Self, LlmError> {
        let client = HttpClient::new()?;
        let mut dispatcher = Self::new(penalty_box)
            .with_cooldown(config.dispatch.cooldown())
            .with_timeout(config.dispatch.timeout());

        let mut last_error = None;
        for endpoint in config.endpoints() {
            if dispatcher.backends.contains_key(&endpoint.provider) {
                continue;
            }
            let provider_config = config.providers.get(&endpoint.provider);
            let built: Result<Arc<dyn LlmBackend>, LlmError> = match endpoint.provider.as_str() {
                "anthropic" => AnthropicBackend::from_provider_config(
                    client.clone(),
                    provider_config,
                    &endpoint.model,
                )
                .map(|b| Arc::new(b) as Arc<dyn LlmBackend>),
                "openai" => OpenAiCompatibleBackend::from_provider_config(
                    client.clone(),
                    provider_config,
                    &endpoint.model,
                )
                .map(|b| Arc::new(b) as Arc<dyn LlmBackend>),
                "gemini" => GeminiBackend::from_provider_config(
                    client.clone(),
                    provider_config,
                    &endpoint.model,
                )
                .map(|b| Arc::new(b) as Arc<dyn LlmBackend>),
                other => Err(LlmError::Unsupported(format!(
                    "no built-in transport for provider '{other}'"
                ))),
            };

            match built {
                Ok(backend) => {
                    debug!(provider = %endpoint.provider, "Registered transport");
                    dispatcher.backends.insert(endpoint.provider.clone(), backend);
                }
                Err(e) => {
                    warn!(provider = %endpoint.provider, error = %e, "Transport unavailable");
                    last_error = Some(e);
                }
            }
        }

        if dispatcher.backends.is_empty()
            && let Some(e) = last_error
        {
            return Err(e);
        }

        Ok(dispatcher)
    }

    /// Register (or replace) the transport for a provider tag.
    #[must_use]
    pub fn with_backend(mut self, provider: impl Into<String>, backend: Arc<dyn LlmBackend>) -> Self {
        self.backends.insert(provider.into(), backend);
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry_observer(mut self, observer: RetryObserver) -> Self {
        self.retry_observer = Some(observer);
        self
    }

    #[must_use]
    pub fn with_usage_observer(mut self, observer: UsageObserver) -> Self {
        self.usage_observer = Some(observer);
        self
    }

    #[must_use]
    pub fn penalty_box(&self) -> &PenaltyBox {
        &self.penalty_box
    }

    /// Dispatch one request across `endpoints` in order.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoEndpoints`] for an empty list
    /// - [`DispatchError::AllPenalized`] when every endpoint was skipped and no
    ///   call was made
    /// - [`DispatchError::AllFailed`] when at least one call was made and all failed
    /// - [`DispatchError::NonTransient`] on the first non-transient failure
    pub async fn dispatch(
        &self,
        endpoints: &[ProviderEndpoint],
        request: &CompletionRequest,
    ) -> Result<CompletionResult, DispatchError> {
        if endpoints.is_empty() {
            return Err(DispatchError::NoEndpoints);
        }
        let span = dispatch_span(&request.label, endpoints.len());
        self.dispatch_inner(endpoints, request).instrument(span).await
    }

    async fn dispatch_inner(
        &self,
        endpoints: &[ProviderEndpoint],
        request: &CompletionRequest,
    ) -> Result<CompletionResult, DispatchError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let mut attempts = 0usize;
        let mut last_error: Option<String> = None;

        for endpoint in endpoints {
            if let Some(remaining) = self.penalty_box.remaining(&endpoint.id) {
                debug!(
                    endpoint = %endpoint.id,
                    remaining_secs = remaining.as_secs(),
                    "Skipping penalized endpoint"
                );
                continue;
            }

            attempts += 1;

            let Some(backend) = self.backends.get(&endpoint.provider) else {
                let message = format!(
                    "no transport registered for provider '{}'",
                    endpoint.provider
                );
                warn!(endpoint = %endpoint.id, "{message}");
                last_error = Some(message);
                continue;
            };

            let invocation = request.to_invocation(&endpoint.model, timeout);
            let outcome = match tokio::time::timeout(timeout, backend.invoke(invocation)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LlmError::Timeout { duration: timeout }),
            };

            match outcome {
                Ok(result) => {
                    let token_usage = result.token_usage();
                    if let (Some(observer), Some(usage)) = (&self.usage_observer, &token_usage) {
                        observer(endpoint, usage);
                    }
                    info!(
                        endpoint = %endpoint.id,
                        attempt = attempts,
                        tokens_input = ?result.tokens_input,
                        tokens_output = ?result.tokens_output,
                        "Dispatch succeeded"
                    );
                    return Ok(CompletionResult {
                        text: result.raw_response,
                        provider_used: endpoint.clone(),
                        token_usage,
                    });
                }
                Err(err) if err.warrants_failover() => {
                    let message = redact_error_message(&err.to_string());
                    warn!(
                        endpoint = %endpoint.id,
                        attempt = attempts,
                        error = %message,
                        "Transient failure, penalizing endpoint and failing over"
                    );
                    self.penalty_box.penalize_with_reason(
                        &endpoint.id,
                        self.cooldown,
                        Some(message.clone()),
                    );
                    if let Some(observer) = &self.retry_observer {
                        observer(&RetryEvent {
                            request_label: request.label.clone(),
                            endpoint_id: endpoint.id.clone(),
                            attempt: attempts,
                            error: message.clone(),
                            cooldown: self.cooldown,
                        });
                    }
                    last_error = Some(message);
                }
                Err(err) => {
                    warn!(
                        endpoint = %endpoint.id,
                        error = %redact_error_message(&err.to_string()),
                        "Non-transient failure, not failing over"
                    );
                    return Err(DispatchError::NonTransient {
                        endpoint: endpoint.id.clone(),
                        source: err,
                    });
                }
            }
        }

        if attempts == 0 {
            let last_error = self
                .penalty_box
                .last_reason(endpoints.iter().map(|e| e.id.as_str()));
            warn!(
                endpoints = endpoints.len(),
                "All endpoints exhausted with zero attempts"
            );
            return Err(DispatchError::AllPenalized {
                endpoints: endpoints.len(),
                last_error,
            });
        }

        warn!(attempts, "All endpoints exhausted after attempts");
        Err(DispatchError::AllFailed {
            attempts,
            last_error: last_error.unwrap_or_default(),
        })
    }

    /// Dispatch, then run the Soft-Strict extraction chain on the response.
    ///
    /// Extraction failure is not an error: the returned `extraction.data` is
    /// `None` and the caller decides how to degrade.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::dispatch`].
    pub async fn dispatch_structured<T: DeserializeOwned>(
        &self,
        endpoints: &[ProviderEndpoint],
        request: &CompletionRequest,
        expected_field: Option<&str>,
    ) -> Result<StructuredCompletion<T>, DispatchError> {
        let completion = self.dispatch(endpoints, request).await?;
        let extraction = extract_structured::<T>(&completion.text, expected_field);
        match extraction.format {
            Some(format) => debug!(
                request = %request.label,
                format = ?format,
                "Structured response extracted"
            ),
            None => warn!(
                request = %request.label,
                endpoint = %completion.provider_used.id,
                "Structured extraction failed on every strategy"
            ),
        }
        Ok(StructuredCompletion {
            completion,
            extraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionFormat;
    use crate::testing::ScriptedBackend;
    use std::sync::Mutex;

    const LONG: Duration = Duration::from_secs(3600);

    fn endpoints(ids: &[&str]) -> Vec<ProviderEndpoint> {
        ids.iter()
            .map(|id| ProviderEndpoint::new(*id, *id, format!("{id}-model")))
            .collect()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("test", "hello")
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let a = Arc::new(ScriptedBackend::new("a").with_response("from a"));
        let b = Arc::new(ScriptedBackend::new("b").with_response("from b"));
        let dispatcher = Dispatcher::new(PenaltyBox::new())
            .with_backend("a", a.clone())
            .with_backend("b", b.clone());

        let result = dispatcher
            .dispatch(&endpoints(&["a", "b"]), &request())
            .await
            .unwrap();

        assert_eq!(result.text, "from a");
        assert_eq!(result.provider_used.id, "a");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_penalizes_and_fails_over() {
        let a = Arc::new(
            ScriptedBackend::new("a").with_error(LlmError::ProviderQuota("429".into())),
        );
        let b = Arc::new(ScriptedBackend::new("b").with_response("from b"));
        let pb = PenaltyBox::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let dispatcher = Dispatcher::new(pb.clone())
            .with_backend("a", a)
            .with_backend("b", b)
            .with_cooldown(LONG)
            .with_retry_observer(Arc::new(move |e: &RetryEvent| {
                sink.lock().unwrap().push(e.endpoint_id.clone());
            }));

        let result = dispatcher
            .dispatch(&endpoints(&["a", "b"]), &request())
            .await
            .unwrap();

        assert_eq!(result.provider_used.id, "b");
        assert!(pb.is_penalized("a"));
        assert!(!pb.is_penalized("b"));
        assert_eq!(*events.lock().unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_penalized_endpoint_is_skipped_without_call() {
        let a = Arc::new(ScriptedBackend::new("a").with_response("from a"));
        let b = Arc::new(ScriptedBackend::new("b").with_response("from b"));
        let pb = PenaltyBox::new();
        pb.penalize("a", LONG);
        let dispatcher = Dispatcher::new(pb)
            .with_backend("a", a.clone())
            .with_backend("b", b);

        let result = dispatcher
            .dispatch(&endpoints(&["a", "b"]), &request())
            .await
            .unwrap();

        assert_eq!(result.provider_used.id, "b");
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_penalized_is_distinct_from_all_failed() {
        let pb = PenaltyBox::new();
        pb.penalize_with_reason("a", LONG, Some("earlier 503".into()));
        pb.penalize("b", LONG);
        let dispatcher = Dispatcher::new(pb)
            .with_backend("a", Arc::new(ScriptedBackend::new("a").with_response("x")))
            .with_backend("b", Arc::new(ScriptedBackend::new("b").with_response("y")));

        let err = dispatcher
            .dispatch(&endpoints(&["a", "b"]), &request())
            .await
            .unwrap_err();

        match &err {
            DispatchError::AllPenalized {
                endpoints,
                last_error,
            } => {
                assert_eq!(*endpoints, 2);
                assert_eq!(last_error.as_deref(), Some("earlier 503"));
            }
            other => panic!("Expected AllPenalized, got {other:?}"),
        }
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_all_failed_carries_last_error() {
        let dispatcher = Dispatcher::new(PenaltyBox::new())
            .with_backend(
                "a",
                Arc::new(
                    ScriptedBackend::new("a").with_error(LlmError::ProviderOutage("502".into())),
                ),
            )
            .with_backend(
                "b",
                Arc::new(ScriptedBackend::new("b").with_error(LlmError::Transport(
                    "connection reset".into(),
                ))),
            );

        let err = dispatcher
            .dispatch(&endpoints(&["a", "b"]), &request())
            .await
            .unwrap_err();

        match err {
            DispatchError::AllFailed {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("connection reset"));
            }
            other => panic!("Expected AllFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_request_propagates_without_penalty() {
        let a = Arc::new(
            ScriptedBackend::new("a").with_error(LlmError::BadRequest("context too long".into())),
        );
        let b = Arc::new(ScriptedBackend::new("b").with_response("from b"));
        let pb = PenaltyBox::new();
        let dispatcher = Dispatcher::new(pb.clone())
            .with_backend("a", a)
            .with_backend("b", b.clone());

        let err = dispatcher
            .dispatch(&endpoints(&["a", "b"]), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::NonTransient { ref endpoint, .. } if endpoint == "a"));
        assert!(!pb.is_penalized("a"));
        assert_eq!(b.calls(), 0);
        assert!(!err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let slow = Arc::new(
            ScriptedBackend::new("slow")
                .with_response("late")
                .with_delay(Duration::from_secs(30)),
        );
        let fast = Arc::new(ScriptedBackend::new("fast").with_response("on time"));
        let pb = PenaltyBox::new();
        let dispatcher = Dispatcher::new(pb.clone())
            .with_backend("slow", slow)
            .with_backend("fast", fast)
            .with_cooldown(LONG);

        let req = request().with_timeout(Duration::from_secs(5));
        let result = dispatcher
            .dispatch(&endpoints(&["slow", "fast"]), &req)
            .await
            .unwrap();

        assert_eq!(result.provider_used.id, "fast");
        assert!(pb.is_penalized("slow"));
    }

    #[tokio::test]
    async fn test_unregistered_provider_counts_as_failed_attempt() {
        let dispatcher = Dispatcher::new(PenaltyBox::new());
        let err = dispatcher
            .dispatch(&endpoints(&["ghost"]), &request())
            .await
            .unwrap_err();
        match err {
            DispatchError::AllFailed { attempts, last_error } => {
                assert_eq!(attempts, 1);
                assert!(last_error.contains("ghost"));
            }
            other => panic!("Expected AllFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_endpoint_list() {
        let dispatcher = Dispatcher::new(PenaltyBox::new());
        let err = dispatcher.dispatch(&[], &request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::NoEndpoints));
    }

    #[tokio::test]
    async fn test_usage_observer_called_once_per_success() {
        let calls = Arc::new(Mutex::new(0u64));
        let sink = calls.clone();
        let dispatcher = Dispatcher::new(PenaltyBox::new())
            .with_backend(
                "a",
                Arc::new(ScriptedBackend::new("a").with_response("ok").with_usage(10, 5)),
            )
            .with_usage_observer(Arc::new(move |_e: &ProviderEndpoint, u: &TokenUsage| {
                *sink.lock().unwrap() += u.total();
            }));

        let result = dispatcher
            .dispatch(&endpoints(&["a"]), &request())
            .await
            .unwrap();

        assert_eq!(result.token_usage.map(|u| u.total()), Some(15));
        assert_eq!(*calls.lock().unwrap(), 15);
    }

    #[tokio::test]
    async fn test_request_parameters_reach_backend() {
        let a = Arc::new(ScriptedBackend::new("a").with_response("ok"));
        let dispatcher = Dispatcher::new(PenaltyBox::new()).with_backend("a", a.clone());
        let req = CompletionRequest::new("classify", "goal text")
            .with_system("be terse")
            .with_temperature(0.8)
            .with_max_tokens(256);

        dispatcher.dispatch(&endpoints(&["a"]), &req).await.unwrap();

        let inv = a.invocations().pop().unwrap();
        assert_eq!(inv.request_label, "classify");
        assert_eq!(inv.model, "a-model");
        assert_eq!(inv.messages.len(), 2);
        assert_eq!(inv.metadata["max_tokens"], serde_json::json!(256));
        assert!(inv.metadata.contains_key("temperature"));
    }

    #[tokio::test]
    async fn test_dispatch_structured_reports_format() {
        let dispatcher = Dispatcher::new(PenaltyBox::new()).with_backend(
            "a",
            Arc::new(
                ScriptedBackend::new("a")
                    .with_response("```yaml\nitems: [1, 2, 3]\n```")
                    .with_response("no structure here"),
            ),
        );
        let eps = endpoints(&["a"]);

        let first = dispatcher
            .dispatch_structured::<Vec<u32>>(&eps, &request(), Some("items"))
            .await
            .unwrap();
        assert_eq!(first.extraction.format, Some(ExtractionFormat::Yaml));
        assert_eq!(first.extraction.data, Some(vec![1, 2, 3]));

        let second = dispatcher
            .dispatch_structured::<Vec<u32>>(&eps, &request(), Some("items"))
            .await
            .unwrap();
        assert!(second.extraction.data.is_none());
    }
}
