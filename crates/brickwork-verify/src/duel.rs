//! Audit duel: audit, at most one repair, one re-audit.

use std::future::Future;

use async_trait::async_trait;
use tracing::{info, warn};

use brickwork_utils::error::VerifyError;
use brickwork_utils::redaction::redact_error_message;
use brickwork_utils::types::Constitution;

use crate::auditor::{Auditor, EvidenceRule};
use crate::types::{AuditResult, DuelOutcome, DuelResult, RepairAttempt};

/// Externally supplied repair capability.
///
/// Receives the rejected artifact and the audit that rejected it (evidence
/// plus repair suggestions) and returns the repaired artifact.
#[async_trait]
pub trait RepairFn: Send + Sync {
    async fn repair(&self, artifact: &str, audit: &AuditResult) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> RepairFn for F
where
    F: Fn(String, AuditResult) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send,
{
    async fn repair(&self, artifact: &str, audit: &AuditResult) -> anyhow::Result<String> {
        (self)(artifact.to_string(), audit.clone()).await
    }
}

/// Bounded duel between an artifact and a hostile auditor.
///
/// A duel is terminal: a `FinalFailure` is never retried here, the caller
/// starts a new duel.
#[derive(Debug, Clone)]
pub struct AuditDuel {
    auditor: Auditor,
}

impl AuditDuel {
    #[must_use]
    pub fn new(auditor: Auditor) -> Self {
        Self { auditor }
    }

    /// Run the duel. Makes at most two audit calls and one repair call.
    ///
    /// The evidence rule applies to the first audit only. A fail on the
    /// re-audit ends the duel whether or not it cites evidence.
    ///
    /// # Errors
    ///
    /// [`VerifyError::Dispatch`] when every endpoint is penalized, and
    /// [`VerifyError::RepairFailed`] when the repair function errors.
    pub async fn conduct_duel(
        &self,
        artifact: &str,
        constitution: &Constitution,
        instruction: &str,
        repair: Option<&dyn RepairFn>,
    ) -> Result<DuelResult, VerifyError> {
        let initial = self.auditor.audit(artifact, constitution, instruction).await?;
        if initial.passed() {
            info!(outcome = %DuelOutcome::Verified, rounds = 1, "Duel finished");
            return Ok(DuelResult {
                outcome: DuelOutcome::Verified,
                final_artifact: artifact.to_string(),
                initial_audit: initial,
                repair_attempt: None,
                total_rounds: 1,
                is_verified: true,
            });
        }

        let Some(repair) = repair else {
            info!(outcome = %DuelOutcome::FinalFailure, rounds = 1, "Duel failed with no repair wired");
            return Ok(DuelResult {
                outcome: DuelOutcome::FinalFailure,
                final_artifact: artifact.to_string(),
                initial_audit: initial,
                repair_attempt: None,
                total_rounds: 1,
                is_verified: false,
            });
        };

        let repaired = repair.repair(artifact, &initial).await.map_err(|e| {
            let message = redact_error_message(&format!("{e:#}"));
            warn!(error = %message, "Repair function failed");
            VerifyError::RepairFailed(message)
        })?;

        let second = self
            .auditor
            .run(&repaired, constitution, instruction, EvidenceRule::Waive)
            .await?;
        let (outcome, is_verified) = if second.passed() {
            (DuelOutcome::RepairedAndVerified, true)
        } else {
            (DuelOutcome::FinalFailure, false)
        };
        info!(outcome = %outcome, rounds = 2, "Duel finished");
        Ok(DuelResult {
            outcome,
            final_artifact: repaired.clone(),
            initial_audit: initial,
            repair_attempt: Some(RepairAttempt {
                repaired_artifact: repaired,
                audit: second,
            }),
            total_rounds: 2,
            is_verified,
        })
    }
}
