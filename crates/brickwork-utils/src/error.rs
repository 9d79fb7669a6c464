use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::redaction::redact_error_message;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `BrickworkError` is the umbrella error returned by the facade crate. Each
/// subsystem has its own typed error; this enum unifies them with `#[from]`
/// conversions so callers can use `?` across subsystem boundaries.
///
/// # Error Categories
///
/// | Category | Description |
/// |----------|-------------|
/// | `Config` | Configuration file or value errors |
/// | `Llm` | A single transport call failed |
/// | `Dispatch` | Multi-endpoint dispatch failed (exhaustion, non-transient error) |
/// | `Decompose` | Decomposition aborted (fatal exhaustion only) |
/// | `Verify` | Verification aborted (fatal exhaustion, repair function failure) |
/// | `Session` | Session store or checkpoint serialization failure |
///
/// # User-Friendly Messages
///
/// Use [`display_for_user()`](Self::display_for_user) to get a formatted message
/// with context and actionable suggestions, suitable for an operator-facing layer.
#[derive(Error, Debug)]
pub enum BrickworkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Decomposition error: {0}")]
    Decompose(#[from] DecomposeError),

    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ProviderIntegration,
    ResourceLimits,
    Decomposition,
    Verification,
    Session,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::ProviderIntegration => write!(f, "Provider Integration"),
            Self::ResourceLimits => write!(f, "Resource Limits"),
            Self::Decomposition => write!(f, "Decomposition"),
            Self::Verification => write!(f, "Verification"),
            Self::Session => write!(f, "Session"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with optional [dispatch], [providers], \
                 [decomposition], [verification] and [logging] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific range requirements."
            )),
            Self::NotFound { .. } => Some(
                "brickwork searches for .brickwork/config.toml starting from the current \
                 directory upward, unless BRICKWORK_CONFIG points at a file."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Compare with the example configuration in the documentation".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "dispatch.endpoints" => vec![
                    "Give every endpoint a unique id".to_string(),
                    "Use one of the supported provider tags: anthropic, openai, gemini"
                        .to_string(),
                ],
                "decomposition.duplicate_threshold" | "decomposition.stall_epsilon" => vec![
                    "Use a value greater than 0 and at most 1".to_string(),
                ],
                _ => vec![
                    "Check the documentation for valid values for this option".to_string(),
                    "Remove the option to use the default value".to_string(),
                ],
            },
            Self::NotFound { .. } => vec![
                "Create .brickwork/config.toml in your project root".to_string(),
                "Unset BRICKWORK_CONFIG or point it at an existing file".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// LLM backend errors for a single transport call.
///
/// The dispatcher relies on [`LlmError::is_transient`] and
/// [`LlmError::warrants_failover`] to decide between penalizing an endpoint and
/// moving on, or surfacing the error immediately.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Transport-level failure (connection refused, DNS, reset)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Model or route not found at this endpoint (404)
    #[error("Endpoint not found: {0}")]
    NotFound(String),

    /// Malformed request or context-length overflow (400 and other 4xx)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Rate limits, server errors, missing routes, network failures and timeouts.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::ProviderQuota(_)
                | Self::ProviderOutage(_)
                | Self::NotFound(_)
                | Self::Timeout { .. }
        )
    }

    /// Whether another endpoint might succeed where this one failed.
    ///
    /// Auth failures are scoped to one vendor's credentials, so they fail over
    /// like transient errors. Malformed requests reproduce everywhere and do not.
    #[must_use]
    pub fn warrants_failover(&self) -> bool {
        self.is_transient() || matches!(self, Self::ProviderAuth(_))
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::NotFound(msg) => format!("LLM endpoint or model not found: {msg}"),
            Self::BadRequest(msg) => format!("LLM provider rejected the request: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {:?}", duration)
            }
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) => Some(
                "Transport errors occur when the provider endpoint cannot be reached.".to_string(),
            ),
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::ProviderQuota(_) => Some(
                "Quota errors occur when rate limits or usage limits are exceeded.".to_string(),
            ),
            Self::ProviderOutage(_) => {
                Some("Provider outages are temporary service disruptions.".to_string())
            }
            Self::NotFound(_) => Some(
                "The model may have been retired or the base URL may point at the wrong route."
                    .to_string(),
            ),
            Self::BadRequest(_) => Some(
                "Malformed requests and context-length overflows fail identically on every \
                 endpoint, so no failover is attempted."
                    .to_string(),
            ),
            Self::Timeout { .. } => Some(
                "Timeouts occur when a completion takes longer than the configured limit."
                    .to_string(),
            ),
            Self::Misconfiguration(_) => Some(
                "Configuration errors indicate missing or invalid provider settings.".to_string(),
            ),
            Self::Unsupported(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) | Self::ProviderOutage(_) => vec![
                "Wait a few minutes and try again".to_string(),
                "Add another endpoint to [[dispatch.endpoints]] for failover".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that the required API key environment variable is set".to_string(),
                "Verify the API key is valid and not expired".to_string(),
            ],
            Self::ProviderQuota(_) => vec![
                "Wait for the penalty-box cool-down to expire and try again".to_string(),
                "Check your provider's rate limits and usage dashboard".to_string(),
            ],
            Self::NotFound(_) => vec![
                "Check the model name configured for this endpoint".to_string(),
                "Check the provider base_url".to_string(),
            ],
            Self::BadRequest(_) => vec![
                "Shorten the goal or constraints to fit the model context window".to_string(),
                "Run with RUST_LOG=brickwork=debug to inspect the request".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase dispatch.timeout_secs".to_string(),
                "Route complex tasks to a faster endpoint".to_string(),
            ],
            Self::Misconfiguration(_) => vec![
                "Check the [providers] section of .brickwork/config.toml".to_string(),
            ],
            Self::Unsupported(_) => vec![
                "Use one of the supported provider tags: anthropic, openai, gemini".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) | Self::Unsupported(_) => {
                ErrorCategory::Configuration
            }
            Self::ProviderQuota(_) => ErrorCategory::ResourceLimits,
            _ => ErrorCategory::ProviderIntegration,
        }
    }
}

/// Errors from a multi-endpoint dispatch.
///
/// `AllPenalized` and `AllFailed` are deliberately distinct: the first means no
/// call was made because every endpoint is cooling down (waiting helps), the
/// second means every endpoint was tried and failed (a different endpoint set
/// is needed).
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("No endpoints supplied for dispatch")]
    NoEndpoints,

    #[error(
        "All {endpoints} endpoint(s) exhausted with zero attempts: every endpoint is in the penalty box"
    )]
    AllPenalized {
        endpoints: usize,
        last_error: Option<String>,
    },

    #[error("All endpoints exhausted after {attempts} attempt(s); last error: {last_error}")]
    AllFailed { attempts: usize, last_error: String },

    #[error("Endpoint '{endpoint}' returned a non-transient error: {source}")]
    NonTransient {
        endpoint: String,
        #[source]
        source: LlmError,
    },
}

impl DispatchError {
    /// Exhaustion with zero attempts is the only fatal dispatch condition.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AllPenalized { .. })
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::AllPenalized { .. } | Self::AllFailed { .. })
    }

    /// The last underlying error message, already redacted.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        match self {
            Self::NoEndpoints => None,
            Self::AllPenalized { last_error, .. } => {
                last_error.as_deref().map(redact_error_message)
            }
            Self::AllFailed { last_error, .. } => Some(redact_error_message(last_error)),
            Self::NonTransient { source, .. } => Some(redact_error_message(&source.to_string())),
        }
    }
}

impl UserFriendlyError for DispatchError {
    fn user_message(&self) -> String {
        match self {
            Self::NoEndpoints => "No provider endpoints are configured".to_string(),
            Self::AllPenalized { endpoints, .. } => format!(
                "All {endpoints} provider endpoint(s) are cooling down after recent failures"
            ),
            Self::AllFailed { attempts, .. } => {
                format!("All provider endpoints failed ({attempts} attempt(s))")
            }
            Self::NonTransient { endpoint, source } => {
                format!("Provider endpoint '{endpoint}' rejected the request: {source}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        self.last_error()
            .map(|last| format!("Last underlying error: {last}"))
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NoEndpoints => vec!["Add at least one [[dispatch.endpoints]] entry".to_string()],
            Self::AllPenalized { .. } => vec![
                "Wait for the cool-down to expire and retry".to_string(),
                "Select an endpoint manually".to_string(),
            ],
            Self::AllFailed { .. } => vec![
                "Add a different provider endpoint to the failover list".to_string(),
                "Check provider status pages and API keys".to_string(),
            ],
            Self::NonTransient { source, .. } => source.suggestions(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NoEndpoints => ErrorCategory::Configuration,
            Self::AllPenalized { .. } | Self::AllFailed { .. } => ErrorCategory::ResourceLimits,
            Self::NonTransient { source, .. } => source.category(),
        }
    }
}

/// Decomposition aborts only on fatal dispatch exhaustion; every other failure
/// degrades to a deterministic fallback.
#[derive(Error, Debug)]
pub enum DecomposeError {
    #[error("Decomposition aborted: {0}")]
    Dispatch(#[from] DispatchError),
}

impl UserFriendlyError for DecomposeError {
    fn user_message(&self) -> String {
        match self {
            Self::Dispatch(e) => format!("Goal decomposition aborted: {}", e.user_message()),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Dispatch(e) => e.context(),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Dispatch(e) => e.suggestions(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Decomposition
    }
}

/// Verification errors. A `fail` verdict is data, not an error.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Verification aborted: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Repair function failed: {0}")]
    RepairFailed(String),
}

impl UserFriendlyError for VerifyError {
    fn user_message(&self) -> String {
        match self {
            Self::Dispatch(e) => format!("Verification aborted: {}", e.user_message()),
            Self::RepairFailed(msg) => format!("The repair step failed: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Dispatch(e) => e.context(),
            Self::RepairFailed(_) => Some(
                "The audit duel allows exactly one repair attempt; the repair function \
                 supplied by the caller returned an error."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Dispatch(e) => e.suggestions(),
            Self::RepairFailed(_) => vec![
                "Inspect the specialist executor used for repairs".to_string(),
                "Start a new duel once the executor is healthy".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Verification
    }
}

/// Session store and checkpoint errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session store error: {0}")]
    Store(String),

    #[error("Session record for '{session_id}' is malformed: {reason}")]
    InvalidRecord { session_id: String, reason: String },

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UserFriendlyError for SessionError {
    fn user_message(&self) -> String {
        match self {
            Self::Store(msg) => format!("Could not access the session store: {msg}"),
            Self::InvalidRecord { session_id, reason } => {
                format!("Session '{session_id}' cannot be resumed: {reason}")
            }
            Self::Serialization(e) => format!("Could not (de)serialize session data: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Sessions persist a single checkpoint that is overwritten on every phase transition."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Store(_) => vec!["Check the persistence backend is reachable".to_string()],
            Self::InvalidRecord { .. } | Self::Serialization(_) => vec![
                "Clear the checkpoint and restart the session from the beginning".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Session
    }
}

impl UserFriendlyError for BrickworkError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Dispatch(e) => e.user_message(),
            Self::Decompose(e) => e.user_message(),
            Self::Verify(e) => e.user_message(),
            Self::Session(e) => e.user_message(),
            Self::Io(e) => format!("File system error: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Llm(e) => e.context(),
            Self::Dispatch(e) => e.context(),
            Self::Decompose(e) => e.context(),
            Self::Verify(e) => e.context(),
            Self::Session(e) => e.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Llm(e) => e.suggestions(),
            Self::Dispatch(e) => e.suggestions(),
            Self::Decompose(e) => e.suggestions(),
            Self::Verify(e) => e.suggestions(),
            Self::Session(e) => e.suggestions(),
            Self::Io(_) => vec!["Check file permissions".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Llm(e) => e.category(),
            Self::Dispatch(e) => e.category(),
            Self::Decompose(e) => e.category(),
            Self::Verify(e) => e.category(),
            Self::Session(e) => e.category(),
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl BrickworkError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// Output is passed through [`redact_error_message`] before it is returned.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error: {}\n", self.user_message()));

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {}\n", ctx));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {}\n", suggestion));
            }
        }

        redact_error_message(&output)
    }
}
