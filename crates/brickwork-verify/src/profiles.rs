//! Mode and strictness profiles for the auditor.

use brickwork_config::Strictness;
use brickwork_utils::types::ProjectMode;

/// What counts as an automatic failure in a project mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub mode: ProjectMode,
    pub reviewer: &'static str,
    pub auto_fail_criteria: &'static [&'static str],
    /// Replacement instruction used when a gap-filling brick drifts out of mode
    pub safe_instruction: &'static str,
}

impl ModeProfile {
    #[must_use]
    pub const fn for_mode(mode: ProjectMode) -> Self {
        match mode {
            ProjectMode::Software => Self {
                mode,
                reviewer: "hostile senior code reviewer",
                auto_fail_criteria: &[
                    "code that does not compile or references undefined symbols",
                    "hardcoded secrets or credentials",
                    "unhandled error paths on user input",
                    "behavior that contradicts the stated tech stack",
                    "placeholder or stub implementations presented as complete",
                ],
                safe_instruction: "Implement and test the missing piece: {title}.",
            },
            ProjectMode::Research => Self {
                mode,
                reviewer: "skeptical peer reviewer",
                auto_fail_criteria: &[
                    "claims without a cited source",
                    "fabricated or unverifiable citations",
                    "conclusions the stated methodology cannot support",
                    "undisclosed limitations or conflicts",
                ],
                safe_instruction: "Add the missing research step with cited sources: {title}.",
            },
            ProjectMode::Legal => Self {
                mode,
                reviewer: "opposing counsel",
                auto_fail_criteria: &[
                    "reliance on law from the wrong jurisdiction",
                    "misstated or invented statutes and precedent",
                    "clauses that conflict with each other",
                    "missing mandatory compliance language",
                ],
                safe_instruction: "Draft the missing legal analysis with citations: {title}.",
            },
            ProjectMode::Creative => Self {
                mode,
                reviewer: "exacting editor",
                auto_fail_criteria: &[
                    "content that contradicts the established premise",
                    "a voice or tone inconsistent with the brief",
                    "material unsuitable for the stated audience",
                ],
                safe_instruction: "Write the missing creative element: {title}.",
            },
            ProjectMode::General => Self {
                mode,
                reviewer: "demanding quality reviewer",
                auto_fail_criteria: &[
                    "the deliverable does not address the instruction",
                    "statements that contradict the stated constraints",
                    "incomplete output presented as finished",
                ],
                safe_instruction: "Produce the missing deliverable: {title}.",
            },
        }
    }

    /// Safe brick instruction for a gap title.
    #[must_use]
    pub fn safe_instruction_for(&self, title: &str) -> String {
        self.safe_instruction.replace("{title}", title.trim_end_matches('.'))
    }
}

/// How aggressively quality issues escalate to a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrictnessProfile {
    pub level: Strictness,
    /// Prompt guidance for the auditor
    pub tone: &'static str,
    /// A fail verdict below this confidence becomes a pass with repair
    /// suggestions. 0 disables softening.
    pub fail_confidence_threshold: u8,
}

impl StrictnessProfile {
    #[must_use]
    pub const fn for_level(level: Strictness) -> Self {
        match level {
            Strictness::Strict => Self {
                level,
                tone: "Fail the artifact for any violation you can cite, including minor quality issues.",
                fail_confidence_threshold: 0,
            },
            Strictness::Balanced => Self {
                level,
                tone: "Fail only for violations of the automatic failure criteria or the constraints. \
                       Report quality issues as repair suggestions.",
                fail_confidence_threshold: 40,
            },
            Strictness::LocalSmall => Self {
                level,
                tone: "You are reviewing output from a small local model. Fail only for clear, \
                       cited violations of the automatic failure criteria; everything else is a \
                       repair suggestion.",
                fail_confidence_threshold: 70,
            },
        }
    }
}
