//! Adversarial Verification Subsystem.
//!
//! - [`Saboteur`]: red-team gap detection over a decomposed plan, with
//!   gap-filling [`MissingBrick`]s spliced back in
//! - [`AuditDuel`]: hostile audit of one artifact, at most one repair and one
//!   re-audit, with the evidence rule applied to every verdict

pub mod auditor;
pub mod checklist;
pub mod duel;
pub mod graph;
pub mod profiles;
pub mod saboteur;
pub mod types;

pub use auditor::{Auditor, normalize_verdict};
pub use brickwork_config::Strictness;
pub use duel::{AuditDuel, RepairFn};
pub use profiles::{ModeProfile, StrictnessProfile};
pub use saboteur::{Saboteur, coverage_score, splice_bricks, union_gaps};
pub use types::{
    AuditResult, BrickPriority, DuelOutcome, DuelResult, EvidenceItem, EvidenceType, GapCategory,
    GapSeverity, IdentifiedGap, MissingBrick, RepairAttempt, SaboteurResult, Verdict,
};
