//! Resilient Dispatch Layer.
//!
//! Every completion call in brickwork goes through a [`Dispatcher`]: an ordered
//! list of [`ProviderEndpoint`]s is tried strictly in sequence, endpoints in the
//! shared [`PenaltyBox`] are skipped, transient failures penalize the endpoint
//! and fail over immediately, and non-transient failures propagate unchanged.
//! [`Dispatcher::dispatch_structured`] adds the Soft-Strict extraction chain
//! from [`extraction`].
//!
//! Vendor transports implement [`LlmBackend`] and perform exactly one attempt
//! per call. [`RetryingBackend`] provides the legacy single-endpoint path with
//! an explicit back-off schedule.

mod anthropic_backend;
pub mod dispatch;
pub mod extraction;
mod gemini_backend;
mod http_client;
mod openai_backend;
pub mod penalty_box;
pub mod retrying_backend;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use anthropic_backend::AnthropicBackend;
pub use brickwork_config::ProviderEndpoint;
pub use brickwork_utils::error::{DispatchError, LlmError};
pub use dispatch::{
    CompletionRequest, CompletionResult, Dispatcher, RetryEvent, RetryObserver,
    StructuredCompletion, UsageObserver,
};
pub use extraction::{ExtractionFormat, ExtractionResult, extract_structured};
pub use gemini_backend::GeminiBackend;
pub use http_client::{HttpClient, HttpParams};
pub use openai_backend::OpenAiCompatibleBackend;
pub use penalty_box::PenaltyBox;
pub use retrying_backend::{LEGACY_BACKOFF_SCHEDULE, RetryingBackend};
pub use types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};
