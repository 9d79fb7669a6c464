//! brickwork - goal decomposition with resilient dispatch and adversarial verification
//!
//! brickwork turns a free-text goal into an ordered plan of atomic tasks, then
//! attacks that plan for gaps before anyone executes it:
//!
//! - **Dispatch**: every model call goes through a [`Dispatcher`] that walks
//!   an ordered endpoint list, skips endpoints in the shared [`PenaltyBox`],
//!   and fails over on transient errors.
//! - **Decomposition**: [`DecompositionEngine`] classifies the domain, proposes
//!   a specialist council, generates tasks and recursively splits the ones
//!   that are not atomic, under depth/task/iteration/stall budgets.
//! - **Verification**: the [`Saboteur`] finds coverage and dependency gaps and
//!   splices gap-filling tasks back in; the [`AuditDuel`] audits an artifact
//!   against the project constitution with at most one repair round.
//! - **Sessions**: [`PlanningPipeline`] checkpoints each phase through a
//!   [`SessionStore`] so an interrupted session resumes where it stopped.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use brickwork::{Config, Constitution, InMemorySessionStore, PlanningPipeline, ProjectMode};
//!
//! # async fn demo() -> Result<(), brickwork::BrickworkError> {
//! let config = Config::discover()?;
//! let store = Arc::new(InMemorySessionStore::new());
//! let pipeline = PlanningPipeline::from_config(config, store)?;
//!
//! let constitution = Constitution::new("Login service", ProjectMode::Software)
//!     .with_tech_stack(["Rust", "PostgreSQL"]);
//! let outcome = pipeline
//!     .run("session-1", "Build a login system", &constitution)
//!     .await?;
//!
//! for task in &outcome.plan.tasks {
//!     println!("{} {}", task.id, task.title);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Stable Public API
//!
//! The re-exports below are the supported surface. The subsystem crates are
//! reachable through [`config`], [`llm`], [`decompose`], [`verify`] and
//! [`session`] for lower-level use.

pub mod orchestrator;

pub use brickwork_config as config;
pub use brickwork_decompose as decompose;
pub use brickwork_llm as llm;
pub use brickwork_session as session;
pub use brickwork_utils as utils;
pub use brickwork_verify as verify;

pub use brickwork_config::{Config, ConfigBuilder, ProviderEndpoint, Strictness};
pub use brickwork_decompose::{
    AtomicTask, CouncilProposal, DecompositionEngine, DomainClassification, PlanResult,
    RoutingPath, StopReason,
};
pub use brickwork_llm::{
    CompletionRequest, CompletionResult, Dispatcher, ExtractionResult, LlmBackend, PenaltyBox,
    extract_structured,
};
pub use brickwork_session::{
    CheckpointManager, InMemorySessionStore, ResumeInfo, SessionCheckpoint, SessionPhase,
    SessionRecord, SessionStore, can_resume,
};
pub use brickwork_utils::{
    BrickworkError, Constitution, DispatchError, ProjectMode, UserFriendlyError,
};
pub use brickwork_verify::{
    AuditDuel, AuditResult, Auditor, DuelOutcome, DuelResult, IdentifiedGap, RepairFn, Saboteur,
    SaboteurResult,
};
pub use orchestrator::{PipelineOutcome, PlanningPipeline};
