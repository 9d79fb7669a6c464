//! Configuration for brickwork.
//!
//! Configuration is read from `.brickwork/config.toml` (discovered upward from
//! a start directory, or named by `BRICKWORK_CONFIG`) or assembled in code with
//! [`Config::builder()`]. Every field is optional in TOML; defaults are applied
//! in code and the result is validated before it is handed out.

mod builder;
mod discovery;
mod model;
mod validation;

pub use builder::ConfigBuilder;
pub use discovery::CONFIG_ENV_VAR;
pub use model::{
    Config, DecompositionConfig, DispatchConfig, KNOWN_PROVIDERS, LoggingConfig, ProviderConfig,
    ProviderEndpoint, ProvidersConfig, Strictness, VerificationConfig,
};
