//! Foundation utilities shared by every brickwork crate.
//!
//! - [`error`]: typed error taxonomy with user-friendly reporting
//! - [`logging`]: `tracing` bootstrap, span helpers, decomposition counters
//! - [`redaction`]: secret scrubbing for error messages
//! - [`types`]: `ProjectMode`, `Constitution`, `TokenUsage`

pub mod error;
pub mod logging;
pub mod redaction;
pub mod types;

pub use error::{
    BrickworkError, ConfigError, DecomposeError, DispatchError, ErrorCategory, LlmError,
    SessionError, UserFriendlyError, VerifyError,
};
pub use types::{Constitution, ProjectMode, TokenUsage};
