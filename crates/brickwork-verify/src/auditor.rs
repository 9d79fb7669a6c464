//! Hostile single-reviewer audit with the evidence rule.
//!
//! A `fail` verdict stands only when it cites at least one evidence item
//! with both a quote and an explanation. A rejection without evidence is voided to `pass`. This is
//! fail-open on purpose and must stay that way.

use std::fmt::Write as _;

use serde::Deserialize;
use tracing::{debug, info, warn};

use brickwork_config::{ProviderEndpoint, Strictness};
use brickwork_llm::{CompletionRequest, Dispatcher};
use brickwork_utils::error::VerifyError;
use brickwork_utils::types::{Constitution, ProjectMode};

use crate::profiles::{ModeProfile, StrictnessProfile};
use crate::types::{AuditResult, EvidenceItem, EvidenceType, Verdict};

const AUDIT_TEMPERATURE: f32 = 0.1;
const DEFAULT_CONFIDENCE: u8 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditDraft {
    verdict: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    evidence: Vec<EvidenceDraft>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default, alias = "repair_suggestions")]
    repair_suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EvidenceDraft {
    #[serde(default, rename = "type")]
    evidence_type: Option<String>,
    #[serde(default, alias = "quote")]
    content: String,
    #[serde(default)]
    explanation: String,
}

impl AuditDraft {
    /// `None` when the verdict is not recognizable.
    fn into_result(self) -> Option<AuditResult> {
        let verdict = match self.verdict.trim().to_lowercase().as_str() {
            "pass" | "passed" | "approve" | "approved" | "verified" => Verdict::Pass,
            "fail" | "failed" | "reject" | "rejected" => Verdict::Fail,
            _ => return None,
        };
        // Values in [0, 1] are fractions; a 1% confidence is not a real answer.
        let confidence = self.confidence.filter(|c| c.is_finite()).map_or(DEFAULT_CONFIDENCE, |c| {
            let percent = if (0.0..=1.0).contains(&c) {
                c * 100.0
            } else {
                c
            };
            percent.round().clamp(0.0, 100.0) as u8
        });
        let evidence = self
            .evidence
            .into_iter()
            .map(|e| EvidenceItem {
                evidence_type: match e.evidence_type.as_deref().map(str::trim) {
                    Some("constitution_quote" | "constitutionQuote") => EvidenceType::ConstitutionQuote,
                    Some("logical_contradiction" | "logicalContradiction") => {
                        EvidenceType::LogicalContradiction
                    }
                    _ => EvidenceType::ArtifactQuote,
                },
                content: e.content,
                explanation: e.explanation,
            })
            .collect();
        Some(AuditResult {
            verdict,
            confidence,
            evidence,
            reasoning: self.reasoning,
            issues: self.issues,
            repair_suggestions: self.repair_suggestions,
        })
    }
}

/// Apply the evidence rule, then strictness softening.
///
/// Pass verdicts never carry evidence. A fail verdict softened by strictness
/// keeps its findings as repair suggestions.
#[must_use]
pub fn normalize_verdict(result: AuditResult, strictness: &StrictnessProfile) -> AuditResult {
    normalize(result, strictness, EvidenceRule::Enforce)
}

/// Whether an evidence-less fail is voided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvidenceRule {
    Enforce,
    /// Re-audits after a repair: a fail stands with or without evidence.
    Waive,
}

fn normalize(mut result: AuditResult, strictness: &StrictnessProfile, rule: EvidenceRule) -> AuditResult {
    result.evidence.retain(EvidenceItem::is_substantive);

    if rule == EvidenceRule::Enforce && result.verdict == Verdict::Fail && result.evidence.is_empty() {
        info!(
            confidence = result.confidence,
            "Fail verdict cited no evidence; voided to pass"
        );
        result.verdict = Verdict::Pass;
        result.reasoning = format!("Rejection voided: no evidence cited. {}", result.reasoning)
            .trim_end()
            .to_string();
    }

    if result.verdict == Verdict::Fail && result.confidence < strictness.fail_confidence_threshold {
        info!(
            confidence = result.confidence,
            threshold = strictness.fail_confidence_threshold,
            strictness = %strictness.level,
            "Low-confidence fail softened to repair suggestions"
        );
        result.verdict = Verdict::Pass;
        result
            .repair_suggestions
            .extend(result.evidence.iter().map(|item| item.explanation.trim().to_string()));
    }

    if result.verdict == Verdict::Pass {
        result.evidence.clear();
    }
    result
}

/// Runs one audit call per [`Auditor::audit`].
#[derive(Debug, Clone)]
pub struct Auditor {
    dispatcher: Dispatcher,
    endpoints: Vec<ProviderEndpoint>,
    mode: ModeProfile,
    strictness: StrictnessProfile,
}

impl Auditor {
    #[must_use]
    pub fn new(
        dispatcher: Dispatcher,
        endpoints: Vec<ProviderEndpoint>,
        mode: ProjectMode,
        strictness: Strictness,
    ) -> Self {
        Self {
            dispatcher,
            endpoints,
            mode: ModeProfile::for_mode(mode),
            strictness: StrictnessProfile::for_level(strictness),
        }
    }

    #[must_use]
    pub fn strictness(&self) -> &StrictnessProfile {
        &self.strictness
    }

    fn system_prompt(&self) -> String {
        let mut system = format!(
            "You are a {}. Your job is to find reasons to reject the artifact. \
             You may only reject with cited evidence: a quote from the constraints, \
             a quote from the artifact, or a logical contradiction. {}\n\nAUTOMATIC FAILURES:\n",
            self.mode.reviewer, self.strictness.tone
        );
        for criterion in self.mode.auto_fail_criteria {
            let _ = writeln!(system, "- {criterion}");
        }
        system.push_str("\nThink briefly, then commit your verdict in a ```yaml block.");
        system
    }

    fn prompt(artifact: &str, constitution: &Constitution, instruction: &str) -> String {
        format!(
            "{context}\nINSTRUCTION: {instruction}\n\nARTIFACT:\n{artifact}\n\n\
             Commit:\n\
             ```yaml\n\
             verdict: pass | fail\n\
             confidence: <0-100>\n\
             evidence:\n  \
               - type: constitution_quote | artifact_quote | logical_contradiction\n    \
                 content: <exact quote>\n    \
                 explanation: <why it violates the instruction>\n\
             reasoning: <one paragraph>\n\
             issues: []\n\
             repairSuggestions: []\n\
             ```",
            context = constitution.context_block(),
        )
    }

    /// Audit one artifact.
    ///
    /// A failed or unreadable audit call passes with a "failed to parse"
    /// reasoning instead of blocking progress.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Dispatch`] when every endpoint is penalized.
    pub async fn audit(
        &self,
        artifact: &str,
        constitution: &Constitution,
        instruction: &str,
    ) -> Result<AuditResult, VerifyError> {
        self.run(artifact, constitution, instruction, EvidenceRule::Enforce)
            .await
    }

    pub(crate) async fn run(
        &self,
        artifact: &str,
        constitution: &Constitution,
        instruction: &str,
        rule: EvidenceRule,
    ) -> Result<AuditResult, VerifyError> {
        let request = CompletionRequest::new("audit", Self::prompt(artifact, constitution, instruction))
            .with_system(self.system_prompt())
            .with_temperature(AUDIT_TEMPERATURE);

        let parsed = match self
            .dispatcher
            .dispatch_structured::<AuditDraft>(&self.endpoints, &request, Some("verdict"))
            .await
        {
            Ok(structured) => structured.extraction.data.and_then(AuditDraft::into_result),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Audit call failed");
                None
            }
        };

        let Some(raw) = parsed else {
            warn!("Audit response unreadable; passing by default");
            return Ok(AuditResult::unparsable());
        };
        let result = normalize(raw, &self.strictness, rule);
        debug!(
            verdict = %result.verdict,
            confidence = result.confidence,
            evidence = result.evidence.len(),
            "Audit complete"
        );
        Ok(result)
    }
}
