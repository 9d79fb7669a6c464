use std::time::Duration;

use brickwork_utils::error::ConfigError;

use crate::model::{Config, ProviderConfig, ProviderEndpoint, Strictness};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use brickwork_config::{Config, Strictness};
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .endpoint("primary", "anthropic", "claude-sonnet-4")
    ///     .endpoint("backup", "openai", "gpt-4o-mini")
    ///     .cooldown(Duration::from_secs(30))
    ///     .max_tasks(20)
    ///     .strictness(Strictness::Strict)
    ///     .build()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.endpoints().len(), 2);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent builder for embedding brickwork without config files.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an endpoint to the failover list.
    #[must_use]
    pub fn endpoint(
        mut self,
        id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.config
            .dispatch
            .endpoints
            .push(ProviderEndpoint::new(id, provider, model));
        self
    }

    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.dispatch.cooldown_secs = cooldown.as_secs();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatch.timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub fn provider(mut self, tag: &str, provider: ProviderConfig) -> Self {
        match tag {
            "anthropic" => self.config.providers.anthropic = Some(provider),
            "openai" => self.config.providers.openai = Some(provider),
            "gemini" => self.config.providers.gemini = Some(provider),
            _ => {}
        }
        self
    }

    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.config.decomposition.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn max_tasks(mut self, max_tasks: usize) -> Self {
        self.config.decomposition.max_tasks = max_tasks;
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.decomposition.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn stall_limit(mut self, stall_limit: usize) -> Self {
        self.config.decomposition.stall_limit = stall_limit;
        self
    }

    #[must_use]
    pub fn duplicate_threshold(mut self, threshold: f64) -> Self {
        self.config.decomposition.duplicate_threshold = threshold;
        self
    }

    #[must_use]
    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.config.verification.strictness = strictness;
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.logging.verbose = verbose;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if any value is out of range.
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_endpoint_order() {
        let config = Config::builder()
            .endpoint("c", "gemini", "gemini-2.0-flash")
            .endpoint("a", "anthropic", "claude")
            .build()
            .unwrap();
        let ids: Vec<&str> = config.endpoints().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_builder_validates() {
        let result = Config::builder().max_iterations(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_sets_provider_section() {
        let config = Config::builder()
            .provider(
                "anthropic",
                ProviderConfig {
                    api_key_env: Some("MY_KEY".into()),
                    ..ProviderConfig::default()
                },
            )
            .build()
            .unwrap();
        assert_eq!(
            config.providers.get("anthropic").and_then(|p| p.api_key_env.as_deref()),
            Some("MY_KEY")
        );
    }
}
