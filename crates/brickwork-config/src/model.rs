use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Penalty-box cool-down applied after a transient failure
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Per-call timeout; an elapsed timeout counts as a transient failure
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Provider tags with a built-in transport
pub const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai", "gemini"];

/// One (vendor, model) pair in the failover list.
///
/// Stateless; the `provider` tag routes the call to a registered transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub id: String,
    pub provider: String,
    pub model: String,
}

impl ProviderEndpoint {
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// `[dispatch]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub cooldown_secs: u64,
    pub timeout_secs: u64,
    /// Ordered failover list
    pub endpoints: Vec<ProviderEndpoint>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            endpoints: Vec::new(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-vendor transport settings (`[providers.<tag>]`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// `[providers]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub anthropic: Option<ProviderConfig>,
    /// Any OpenAI-compatible chat completions endpoint
    pub openai: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
}

impl ProvidersConfig {
    /// Settings for a provider tag, if that section is present.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<&ProviderConfig> {
        match provider {
            "anthropic" => self.anthropic.as_ref(),
            "openai" => self.openai.as_ref(),
            "gemini" => self.gemini.as_ref(),
            _ => None,
        }
    }
}

/// `[decomposition]` section: bounds for the recursive split queue
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecompositionConfig {
    pub max_depth: usize,
    pub max_tasks: usize,
    pub max_iterations: usize,
    /// Consecutive non-improving splits before a branch is frozen
    pub stall_limit: usize,
    /// Minimum atomicity-score gain that counts as progress
    pub stall_epsilon: f64,
    /// Token-set Jaccard overlap at which two tasks are merged
    pub duplicate_threshold: f64,
    pub base_temperature: f32,
    /// Used for the single retry after an empty task array
    pub retry_temperature: f32,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_tasks: 60,
            max_iterations: 40,
            stall_limit: 3,
            stall_epsilon: 0.05,
            duplicate_threshold: 0.9,
            base_temperature: 0.4,
            retry_temperature: 0.8,
        }
    }
}

/// How aggressively audit findings escalate to a hard failure.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strictness {
    Strict,
    #[default]
    Balanced,
    /// Small local models: only confident, evidenced failures escalate
    LocalSmall,
}

/// `[verification]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub strictness: Strictness,
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
}

/// Configuration for brickwork.
///
/// # Example
///
/// ```rust
/// use brickwork_config::Config;
///
/// let config = Config::from_toml_str(r#"
/// [dispatch]
/// cooldown_secs = 30
///
/// [[dispatch.endpoints]]
/// id = "primary"
/// provider = "anthropic"
/// model = "claude-sonnet-4"
/// "#)?;
///
/// assert_eq!(config.dispatch.cooldown_secs, 30);
/// assert_eq!(config.endpoints()[0].id, "primary");
/// assert_eq!(config.decomposition.max_tasks, 60);
/// # Ok::<(), brickwork_utils::error::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub dispatch: DispatchConfig,
    pub providers: ProvidersConfig,
    pub decomposition: DecompositionConfig,
    pub verification: VerificationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Ordered failover list.
    #[must_use]
    pub fn endpoints(&self) -> &[ProviderEndpoint] {
        &self.dispatch.endpoints
    }

    /// Endpoints whose provider tag matches `provider`, in configured order.
    #[must_use]
    pub fn endpoints_for(&self, provider: &str) -> Vec<ProviderEndpoint> {
        self.dispatch
            .endpoints
            .iter()
            .filter(|e| e.provider == provider)
            .cloned()
            .collect()
    }
}
