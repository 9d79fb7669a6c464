use std::collections::HashSet;

use brickwork_utils::error::ConfigError;

use crate::model::{Config, KNOWN_PROVIDERS};

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.timeout_secs == 0 {
            return Err(invalid("dispatch.timeout_secs", "must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.dispatch.endpoints {
            if endpoint.id.trim().is_empty() {
                return Err(invalid("dispatch.endpoints", "endpoint id must not be empty"));
            }
            if endpoint.model.trim().is_empty() {
                return Err(invalid(
                    "dispatch.endpoints",
                    format!("endpoint '{}' has no model", endpoint.id),
                ));
            }
            if !KNOWN_PROVIDERS.contains(&endpoint.provider.as_str()) {
                return Err(invalid(
                    "dispatch.endpoints",
                    format!(
                        "endpoint '{}' uses unknown provider '{}'",
                        endpoint.id, endpoint.provider
                    ),
                ));
            }
            if !seen.insert(endpoint.id.as_str()) {
                return Err(invalid(
                    "dispatch.endpoints",
                    format!("duplicate id '{}'", endpoint.id),
                ));
            }
        }

        for (tag, provider) in [
            ("anthropic", &self.providers.anthropic),
            ("openai", &self.providers.openai),
            ("gemini", &self.providers.gemini),
        ] {
            let Some(provider) = provider else { continue };
            if let Some(temperature) = provider.temperature
                && !(0.0..=2.0).contains(&temperature)
            {
                return Err(invalid(
                    &format!("providers.{tag}.temperature"),
                    "must be between 0.0 and 2.0",
                ));
            }
            if provider.max_tokens == Some(0) {
                return Err(invalid(
                    &format!("providers.{tag}.max_tokens"),
                    "must be greater than 0",
                ));
            }
        }

        let d = &self.decomposition;
        for (key, value) in [
            ("decomposition.max_depth", d.max_depth),
            ("decomposition.max_tasks", d.max_tasks),
            ("decomposition.max_iterations", d.max_iterations),
            ("decomposition.stall_limit", d.stall_limit),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than 0"));
            }
        }
        for (key, value) in [
            ("decomposition.stall_epsilon", d.stall_epsilon),
            ("decomposition.duplicate_threshold", d.duplicate_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(key, format!("{value} is outside (0, 1]")));
            }
        }
        for (key, value) in [
            ("decomposition.base_temperature", d.base_temperature),
            ("decomposition.retry_temperature", d.retry_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(invalid(key, "must be between 0.0 and 2.0"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProviderConfig, ProviderEndpoint};

    fn key_of(err: ConfigError) -> String {
        match err {
            ConfigError::InvalidValue { key, .. } => key,
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_duplicate_endpoint_ids() {
        let mut config = Config::default();
        config.dispatch.endpoints = vec![
            ProviderEndpoint::new("a", "anthropic", "m1"),
            ProviderEndpoint::new("a", "openai", "m2"),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate id 'a'"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let mut config = Config::default();
        config.dispatch.endpoints = vec![ProviderEndpoint::new("a", "carrier-pigeon", "m")];
        assert_eq!(key_of(config.validate().unwrap_err()), "dispatch.endpoints");
    }

    #[test]
    fn test_rejects_zero_budgets() {
        let mut config = Config::default();
        config.decomposition.max_tasks = 0;
        assert_eq!(
            key_of(config.validate().unwrap_err()),
            "decomposition.max_tasks"
        );
    }

    #[test]
    fn test_rejects_threshold_outside_unit_interval() {
        let mut config = Config::default();
        config.decomposition.duplicate_threshold = 1.5;
        assert_eq!(
            key_of(config.validate().unwrap_err()),
            "decomposition.duplicate_threshold"
        );

        config.decomposition.duplicate_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_provider_temperature_out_of_range() {
        let mut config = Config::default();
        config.providers.openai = Some(ProviderConfig {
            temperature: Some(3.0),
            ..ProviderConfig::default()
        });
        assert_eq!(
            key_of(config.validate().unwrap_err()),
            "providers.openai.temperature"
        );
    }
}
