//! Atomic Decomposition Engine.
//!
//! Compiles a goal into a dependency-ordered list of [`AtomicTask`]s:
//! domain classification, specialist council, task generation, queue-driven
//! splitting of non-atomic tasks, duplicate merging and topological ordering.
//! Heuristics read the data tables in [`patterns`].

pub mod assignment;
pub mod atomicity;
pub mod drift;
pub mod engine;
pub mod fallback;
pub mod merge;
pub mod ordering;
pub mod patterns;
mod prompts;
pub mod routing;
pub mod text;
pub mod types;

pub use engine::{DecompositionEngine, RefineOutcome};
pub use types::{
    AtomicTask, CouncilProposal, DecompositionLimits, DomainClassification, PlanResult,
    RoutingPath, Specialist, StopReason, estimate_tokens,
};
