//! Verification result types.

use serde::{Deserialize, Serialize};

use brickwork_decompose::AtomicTask;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GapSeverity {
    Critical,
    Major,
    Minor,
}

impl GapSeverity {
    /// Points subtracted from the coverage score for one gap.
    #[must_use]
    pub const fn penalty(self) -> u8 {
        match self {
            Self::Critical => 20,
            Self::Major => 10,
            Self::Minor => 5,
        }
    }

    /// Critical and major gaps become missing bricks.
    #[must_use]
    pub const fn warrants_brick(self) -> bool {
        matches!(self, Self::Critical | Self::Major)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GapCategory {
    /// Required aspect of the mode has no covering task
    Coverage,
    /// Dangling reference or cycle in the task graph
    Dependency,
    Security,
    Testing,
    ErrorHandling,
    #[serde(other)]
    Other,
}

/// A weakness found in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedGap {
    pub id: String,
    pub severity: GapSeverity,
    pub category: GapCategory,
    pub title: String,
    pub description: String,
    /// Task ids the gap concerns
    #[serde(default)]
    pub affected_tasks: Vec<String>,
    pub suggested_fix: String,
}

impl IdentifiedGap {
    /// Stable id derived from the category and title.
    #[must_use]
    pub fn derive_id(category: GapCategory, title: &str) -> String {
        let key = format!("{category}:{}", normalize_title(title));
        let hash = blake3::hash(key.as_bytes());
        format!("gap-{}", &hash.to_hex()[..8])
    }
}

/// Lowercased alphanumeric words joined by single spaces; the dedupe key.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BrickPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl From<GapSeverity> for BrickPriority {
    fn from(severity: GapSeverity) -> Self {
        match severity {
            GapSeverity::Critical => Self::Critical,
            GapSeverity::Major => Self::High,
            GapSeverity::Minor => Self::Low,
        }
    }
}

/// Gap-filling task waiting to be spliced into a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingBrick {
    pub id: String,
    pub title: String,
    pub instruction: String,
    #[serde(default)]
    pub priority: BrickPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_before: Option<String>,
    #[serde(default)]
    pub reason: String,
    pub complexity: u8,
}

/// Outcome of a saboteur stress test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaboteurResult {
    pub gaps: Vec<IdentifiedGap>,
    pub bricks: Vec<MissingBrick>,
    /// The plan with bricks spliced in
    pub tasks: Vec<AtomicTask>,
    /// 0-100
    pub coverage_score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EvidenceType {
    ConstitutionQuote,
    ArtifactQuote,
    LogicalContradiction,
}

/// Citation backing a fail verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    pub content: String,
    #[serde(default)]
    pub explanation: String,
}

impl EvidenceItem {
    #[must_use]
    /// Both the quote and the explanation are non-blank.
    pub fn is_substantive(&self) -> bool {
        !self.content.trim().is_empty() && !self.explanation.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

/// One audit of one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub verdict: Verdict,
    /// 0-100
    pub confidence: u8,
    /// Non-empty for `Fail`, empty for `Pass`
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub repair_suggestions: Vec<String>,
}

impl AuditResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Fail-open result used when the audit response cannot be read.
    #[must_use]
    pub fn unparsable() -> Self {
        Self {
            verdict: Verdict::Pass,
            confidence: 0,
            evidence: Vec::new(),
            reasoning: "failed to parse audit response; passing by default".to_string(),
            issues: Vec::new(),
            repair_suggestions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DuelOutcome {
    Verified,
    RepairedAndVerified,
    FinalFailure,
}

/// The single repair round of a duel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAttempt {
    pub repaired_artifact: String,
    pub audit: AuditResult,
}

/// Terminal result of one audit duel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelResult {
    pub outcome: DuelOutcome,
    pub final_artifact: String,
    pub initial_audit: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_attempt: Option<RepairAttempt>,
    /// 1 or 2
    pub total_rounds: u8,
    pub is_verified: bool,
}
