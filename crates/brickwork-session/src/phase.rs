use serde::{Deserialize, Serialize};

/// Linear phase lattice of a planning session.
///
/// Phases only move forward. `Complete` is terminal.
///
/// # Example
///
/// ```rust
/// use brickwork_session::SessionPhase;
///
/// assert_eq!(SessionPhase::Idle.next(), Some(SessionPhase::Genesis));
/// assert_eq!(SessionPhase::Complete.next(), None);
/// assert_eq!(SessionPhase::PrismB.as_str(), "prism_b");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    /// Constitution captured
    Genesis,
    /// Domain classified
    PrismA,
    /// Council proposed
    PrismB,
    /// Tasks generated and refined
    PrismC,
    /// Plan stress-tested
    Saboteur,
    AwaitingReview,
    ExecutionStarted,
    ExecutionInProgress,
    Complete,
}

/// Number of transitions from `Idle` to `Complete`.
pub const TOTAL_PHASE_STEPS: u32 = 9;

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Position in the lattice, `Idle` = 0.
    #[must_use]
    pub const fn ordinal(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        Some(match self {
            Self::Idle => Self::Genesis,
            Self::Genesis => Self::PrismA,
            Self::PrismA => Self::PrismB,
            Self::PrismB => Self::PrismC,
            Self::PrismC => Self::Saboteur,
            Self::Saboteur => Self::AwaitingReview,
            Self::AwaitingReview => Self::ExecutionStarted,
            Self::ExecutionStarted => Self::ExecutionInProgress,
            Self::ExecutionInProgress => Self::Complete,
            Self::Complete => return None,
        })
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Human-readable description for resume prompts.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Idle => "Session created, nothing run yet",
            Self::Genesis => "Project constitution captured",
            Self::PrismA => "Domain classified",
            Self::PrismB => "Specialist council assembled",
            Self::PrismC => "Task plan generated",
            Self::Saboteur => "Plan stress-tested for gaps",
            Self::AwaitingReview => "Plan ready for review",
            Self::ExecutionStarted => "Execution started",
            Self::ExecutionInProgress => "Execution in progress",
            Self::Complete => "Session complete",
        }
    }

    /// Fraction of the lattice covered once this phase is reached.
    #[must_use]
    pub fn completion(self) -> f64 {
        f64::from(self.ordinal()) / f64::from(TOTAL_PHASE_STEPS)
    }
}
