use std::path::{Path, PathBuf};

use brickwork_utils::error::ConfigError;
use tracing::debug;

use crate::model::Config;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BRICKWORK_CONFIG";

impl Config {
    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFile`] on TOML errors and
    /// [`ConfigError::InvalidValue`] when validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                return Err(ConfigError::InvalidFile(format!(
                    "{}: {e}",
                    path.display()
                )));
            }
        };
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::InvalidFile(reason) => {
                ConfigError::InvalidFile(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    /// Discover configuration from the current directory.
    ///
    /// # Errors
    ///
    /// See [`Config::discover_from`].
    pub fn discover() -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir()
            .map_err(|e| ConfigError::InvalidFile(format!("Failed to get current directory: {e}")))?;
        Self::discover_from(&start_dir)
    }

    /// Discover configuration starting from a specific directory.
    ///
    /// `BRICKWORK_CONFIG` wins when set. Otherwise the nearest
    /// `.brickwork/config.toml` at or above `start_dir` is loaded, stopping at
    /// the repository root. With no file found, built-in defaults are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file is missing, unparsable or invalid.
    pub fn discover_from(start_dir: &Path) -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::discover_with_override(start_dir, explicit.as_deref())
    }

    /// Path-driven variant of [`Config::discover_from`] that avoids process-global state.
    ///
    /// # Errors
    ///
    /// See [`Config::discover_from`].
    pub fn discover_with_override(
        start_dir: &Path,
        explicit: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "Loading config from explicit path");
            return Self::load(path);
        }

        match Self::discover_config_file_from(start_dir) {
            Some(path) => {
                debug!(path = %path.display(), "Discovered config file");
                Self::load(&path)
            }
            None => {
                debug!(start_dir = %start_dir.display(), "No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Walk upward from `start_dir` looking for `.brickwork/config.toml`.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let config_path = dir.join(".brickwork").join("config.toml");
            if config_path.is_file() {
                return Some(config_path);
            }

            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }

            current = dir.parent();
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Strictness;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(".brickwork");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_full_toml_round_trip() {
        let config = Config::from_toml_str(
            r#"
[dispatch]
cooldown_secs = 15
timeout_secs = 45

[[dispatch.endpoints]]
id = "claude"
provider = "anthropic"
model = "claude-sonnet-4"

[[dispatch.endpoints]]
id = "local"
provider = "openai"
model = "qwen2.5-7b"

[providers.openai]
base_url = "http://localhost:11434/v1"
api_key_env = "LOCAL_KEY"

[decomposition]
max_tasks = 12
stall_limit = 2

[verification]
strictness = "local_small"

[logging]
verbose = true
"#,
        )
        .unwrap();

        assert_eq!(config.dispatch.cooldown_secs, 15);
        assert_eq!(config.endpoints().len(), 2);
        assert_eq!(config.endpoints()[1].provider, "openai");
        assert_eq!(config.endpoints_for("anthropic").len(), 1);
        assert_eq!(
            config.providers.get("openai").and_then(|p| p.base_url.as_deref()),
            Some("http://localhost:11434/v1")
        );
        assert_eq!(config.decomposition.max_tasks, 12);
        assert_eq!(config.decomposition.max_depth, 3);
        assert_eq!(config.verification.strictness, Strictness::LocalSmall);
        assert!(config.logging.verbose);
    }

    #[test]
    fn test_invalid_toml_is_invalid_file() {
        let err = Config::from_toml_str("[dispatch\ncooldown_secs = ").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFile(_)));
    }

    #[test]
    fn test_discovers_config_in_ancestor() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[decomposition]\nmax_iterations = 7\n");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_with_override(&nested, None).unwrap();
        assert_eq!(config.decomposition.max_iterations, 7);
    }

    #[test]
    fn test_discovery_stops_at_repository_root() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[decomposition]\nmax_iterations = 7\n");
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();

        let config = Config::discover_with_override(&repo, None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_explicit_path_wins() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[decomposition]\nmax_iterations = 7\n");
        let other = temp.path().join("other.toml");
        std::fs::write(&other, "[decomposition]\nmax_iterations = 9\n").unwrap();

        let config = Config::discover_with_override(temp.path(), Some(&other)).unwrap();
        assert_eq!(config.decomposition.max_iterations, 9);
    }

    #[test]
    fn test_missing_explicit_path_is_not_found() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        let err = Config::discover_with_override(temp.path(), Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "not = [valid");
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
