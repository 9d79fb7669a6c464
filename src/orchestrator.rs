//! Checkpointed planning pipeline.
//!
//! [`PlanningPipeline`] drives one session through the planning phases:
//!
//! `genesis → prism_a → prism_b → prism_c → saboteur → awaiting_review`
//!
//! Each stage's output is persisted in the session record together with a
//! fresh checkpoint. Running the pipeline again on the same session id loads
//! the persisted outputs and skips every phase already reached, so an
//! interrupted run resumes without repeating model calls.
//!
//! After review, [`PlanningPipeline::begin_execution`],
//! [`PlanningPipeline::verify_artifact`] and [`PlanningPipeline::complete`]
//! carry the session through execution.

use std::sync::Arc;

use brickwork_config::Config;
use brickwork_decompose::{
    AtomicTask, CouncilProposal, DecompositionEngine, DecompositionLimits, DomainClassification,
    PlanResult,
};
use brickwork_llm::{Dispatcher, PenaltyBox};
use brickwork_session::{CheckpointManager, SessionCheckpoint, SessionPhase, SessionRecord, SessionStore};
use brickwork_utils::{BrickworkError, Constitution, SessionError};
use brickwork_verify::{AuditDuel, Auditor, DuelResult, RepairFn, SaboteurResult, Saboteur};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

const GOAL_KEY: &str = "goal";
const CONSTITUTION_KEY: &str = "constitution";
const CLASSIFICATION_KEY: &str = "classification";
const COUNCIL_KEY: &str = "council";
const PLAN_KEY: &str = "plan";
const VERIFICATION_KEY: &str = "verification";
const VERIFIED_TASKS_KEY: &str = "verifiedTasks";
const LAST_DUEL_KEY: &str = "lastDuel";

/// Result of a planning run, fresh or resumed.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub session_id: String,
    /// Plan with the Saboteur's bricks spliced in
    pub plan: PlanResult,
    pub verification: SaboteurResult,
    /// Phase the session had reached before this run, if it was resumed
    pub resumed_from: Option<SessionPhase>,
}

/// Binds a dispatcher, configuration and session store into the phase pipeline.
#[derive(Clone)]
pub struct PlanningPipeline {
    dispatcher: Dispatcher,
    config: Config,
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for PlanningPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningPipeline")
            .field("dispatcher", &self.dispatcher)
            .field("endpoints", &self.config.endpoints().len())
            .finish_non_exhaustive()
    }
}

impl PlanningPipeline {
    pub fn new(dispatcher: Dispatcher, config: Config, store: Arc<dyn SessionStore>) -> Self {
        Self {
            dispatcher,
            config,
            store,
        }
    }

    /// Build the dispatcher from `config` with a fresh penalty box.
    ///
    /// # Errors
    ///
    /// Returns [`BrickworkError::Llm`] when no transport could be built.
    pub fn from_config(config: Config, store: Arc<dyn SessionStore>) -> Result<Self, BrickworkError> {
        let dispatcher = Dispatcher::from_config(&config, PenaltyBox::new())?;
        Ok(Self::new(dispatcher, config, store))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self, session_id: &str) -> CheckpointManager {
        CheckpointManager::new(Arc::clone(&self.store), session_id)
    }

    fn engine(&self) -> DecompositionEngine {
        DecompositionEngine::new(self.dispatcher.clone(), self.config.endpoints().to_vec())
            .with_limits(DecompositionLimits::from(&self.config.decomposition))
    }

    fn auditor(&self, constitution: &Constitution) -> Auditor {
        Auditor::new(
            self.dispatcher.clone(),
            self.config.endpoints().to_vec(),
            constitution.mode,
            self.config.verification.strictness,
        )
    }

    /// Run (or resume) planning up to `awaiting_review`.
    ///
    /// On a resumed session the persisted goal and constitution take
    /// precedence over the arguments.
    ///
    /// # Errors
    ///
    /// Fatal dispatch exhaustion from any stage (also recorded on the
    /// checkpoint), store failures, and malformed session records.
    pub async fn run(
        &self,
        session_id: &str,
        goal: &str,
        constitution: &Constitution,
    ) -> Result<PipelineOutcome, BrickworkError> {
        let session = self.session(session_id);
        let reached = session
            .current()
            .await?
            .map_or(SessionPhase::Idle, |checkpoint| checkpoint.phase);
        let record = session.record().await?.unwrap_or_default();
        let resumed_from = (reached != SessionPhase::Idle).then_some(reached);
        if let Some(phase) = resumed_from {
            info!(session_id, phase = %phase, "Resuming session");
        }

        let stages = Stages {
            session_id,
            reached,
            record: &record,
        };

        let (goal, constitution) = if reached >= SessionPhase::Genesis {
            (
                stages.require::<String>(SessionPhase::Genesis, GOAL_KEY)?,
                stages.require::<Constitution>(SessionPhase::Genesis, CONSTITUTION_KEY)?,
            )
        } else {
            let mut partial = SessionRecord::new();
            insert(&mut partial, GOAL_KEY, goal)?;
            insert(&mut partial, CONSTITUTION_KEY, constitution)?;
            session.checkpoint(SessionPhase::Genesis, partial).await?;
            (goal.to_string(), constitution.clone())
        };

        let engine = self.engine();

        let classification: DomainClassification = match stages.stored(SessionPhase::PrismA, CLASSIFICATION_KEY)? {
            Some(classification) => classification,
            None => {
                let classification = guard(&session, engine.classify_domain(&goal, &constitution).await).await?;
                session
                    .checkpoint(SessionPhase::PrismA, single(CLASSIFICATION_KEY, &classification)?)
                    .await?;
                classification
            }
        };

        let council: CouncilProposal = match stages.stored(SessionPhase::PrismB, COUNCIL_KEY)? {
            Some(council) => council,
            None => {
                let council = guard(
                    &session,
                    engine.propose_council(&goal, &constitution, &classification).await,
                )
                .await?;
                session
                    .checkpoint(SessionPhase::PrismB, single(COUNCIL_KEY, &council)?)
                    .await?;
                council
            }
        };

        let mut plan: PlanResult = match stages.stored(SessionPhase::PrismC, PLAN_KEY)? {
            Some(plan) => plan,
            None => {
                let tasks = guard(&session, engine.generate_tasks(&goal, &constitution, &council).await).await?;
                let plan = guard(
                    &session,
                    engine
                        .finish_plan(&goal, &constitution, classification, council, tasks)
                        .await,
                )
                .await?;
                plan.stats.log_summary(goal.chars().count(), plan.tasks.len());
                session
                    .checkpoint(SessionPhase::PrismC, single(PLAN_KEY, &plan)?)
                    .await?;
                plan
            }
        };

        let verification: SaboteurResult = match stages.stored(SessionPhase::Saboteur, VERIFICATION_KEY)? {
            Some(verification) => verification,
            None => {
                let saboteur = Saboteur::new(self.dispatcher.clone(), self.config.endpoints().to_vec());
                let verification = guard(&session, saboteur.stress_test(&plan, &constitution).await).await?;
                plan.tasks = verification.tasks.clone();

                let mut partial = single(VERIFICATION_KEY, &verification)?;
                insert(&mut partial, PLAN_KEY, &plan)?;
                session.checkpoint(SessionPhase::Saboteur, partial).await?;
                verification
            }
        };

        if reached < SessionPhase::AwaitingReview {
            session
                .checkpoint(SessionPhase::AwaitingReview, SessionRecord::new())
                .await?;
        }

        info!(
            session_id,
            tasks = plan.tasks.len(),
            gaps = verification.gaps.len(),
            coverage = verification.coverage_score,
            "Plan ready for review"
        );
        Ok(PipelineOutcome {
            session_id: session_id.to_string(),
            plan,
            verification,
            resumed_from,
        })
    }

    /// Move a reviewed plan into execution.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidRecord`] when planning has not reached review.
    pub async fn begin_execution(&self, session_id: &str) -> Result<SessionCheckpoint, BrickworkError> {
        let session = self.session(session_id);
        let reached = current_phase(&session).await?;
        if reached < SessionPhase::AwaitingReview {
            return Err(invalid(session_id, format!("plan not ready for execution (phase {reached})")));
        }
        if reached >= SessionPhase::ExecutionStarted {
            return Err(invalid(session_id, format!("execution already begun (phase {reached})")));
        }

        let plan: PlanResult = load(&session, PLAN_KEY).await?;
        let total = enabled_count(&plan.tasks);
        Ok(session
            .checkpoint_progress(SessionPhase::ExecutionStarted, 0, total, None, SessionRecord::new())
            .await?)
    }

    /// Audit the artifact produced for `task_id` through a duel and record
    /// progress.
    ///
    /// A task counts as done once a duel verifies its artifact.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidRecord`] outside execution or for an unknown
    /// task; otherwise the duel's errors.
    pub async fn verify_artifact(
        &self,
        session_id: &str,
        task_id: &str,
        artifact: &str,
        repair: Option<&dyn RepairFn>,
    ) -> Result<DuelResult, BrickworkError> {
        let session = self.session(session_id);
        let reached = current_phase(&session).await?;
        if !matches!(
            reached,
            SessionPhase::ExecutionStarted | SessionPhase::ExecutionInProgress
        ) {
            return Err(invalid(session_id, format!("session is not executing (phase {reached})")));
        }

        let plan: PlanResult = load(&session, PLAN_KEY).await?;
        let constitution: Constitution = load(&session, CONSTITUTION_KEY).await?;
        let Some(task) = plan.tasks.iter().find(|task| task.id == task_id) else {
            return Err(invalid(session_id, format!("unknown task '{task_id}'")));
        };

        let duel = AuditDuel::new(self.auditor(&constitution));
        let result = guard(
            &session,
            duel.conduct_duel(artifact, &constitution, &task.instruction, repair)
                .await,
        )
        .await?;

        let record = session.record().await?.unwrap_or_default();
        let mut verified: Vec<String> = match record.get(VERIFIED_TASKS_KEY) {
            Some(value) => serde_json::from_value(value.clone()).map_err(SessionError::from)?,
            None => Vec::new(),
        };
        if result.is_verified && !verified.iter().any(|id| id == task_id) {
            verified.push(task_id.to_string());
        }

        let completed = plan
            .tasks
            .iter()
            .filter(|task| task.enabled && verified.contains(&task.id))
            .count();
        let mut partial = single(VERIFIED_TASKS_KEY, &verified)?;
        insert(&mut partial, LAST_DUEL_KEY, &result)?;
        session
            .checkpoint_progress(
                SessionPhase::ExecutionInProgress,
                u32::try_from(completed).unwrap_or(u32::MAX),
                enabled_count(&plan.tasks),
                Some(task_id.to_string()),
                partial,
            )
            .await?;

        info!(
            session_id,
            task_id,
            outcome = %result.outcome,
            completed,
            "Artifact audited"
        );
        Ok(result)
    }

    /// Mark the session complete. A completed session is not resumable.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidRecord`] before execution has begun.
    pub async fn complete(&self, session_id: &str) -> Result<SessionCheckpoint, BrickworkError> {
        let session = self.session(session_id);
        let reached = current_phase(&session).await?;
        if reached < SessionPhase::ExecutionStarted {
            return Err(invalid(session_id, format!("cannot complete from phase {reached}")));
        }
        Ok(session
            .checkpoint(SessionPhase::Complete, SessionRecord::new())
            .await?)
    }
}

/// Stage outputs persisted by an earlier run.
struct Stages<'a> {
    session_id: &'a str,
    reached: SessionPhase,
    record: &'a SessionRecord,
}

impl Stages<'_> {
    /// Output of `phase` if the session already passed it.
    fn stored<T: DeserializeOwned>(&self, phase: SessionPhase, key: &str) -> Result<Option<T>, SessionError> {
        if self.reached < phase {
            return Ok(None);
        }
        self.require(phase, key).map(Some)
    }

    fn require<T: DeserializeOwned>(&self, phase: SessionPhase, key: &str) -> Result<T, SessionError> {
        let value = self.record.get(key).ok_or_else(|| SessionError::InvalidRecord {
            session_id: self.session_id.to_string(),
            reason: format!("phase {phase} reached but '{key}' is missing"),
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Record a failed stage on the checkpoint before surfacing the error.
async fn guard<T, E>(session: &CheckpointManager, result: Result<T, E>) -> Result<T, BrickworkError>
where
    E: Into<BrickworkError>,
{
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            let error: BrickworkError = e.into();
            if let Err(store_error) = session.record_error(&error.to_string()).await {
                warn!(error = %store_error, "Could not record stage failure");
            }
            Err(error)
        }
    }
}

async fn current_phase(session: &CheckpointManager) -> Result<SessionPhase, SessionError> {
    Ok(session
        .current()
        .await?
        .map_or(SessionPhase::Idle, |checkpoint| checkpoint.phase))
}

async fn load<T: DeserializeOwned>(session: &CheckpointManager, key: &str) -> Result<T, SessionError> {
    let record = session.record().await?.unwrap_or_default();
    let value = record.get(key).ok_or_else(|| SessionError::InvalidRecord {
        session_id: session.session_id().to_string(),
        reason: format!("'{key}' is missing"),
    })?;
    Ok(serde_json::from_value(value.clone())?)
}

fn insert<T: Serialize + ?Sized>(record: &mut SessionRecord, key: &str, value: &T) -> Result<(), SessionError> {
    record.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(())
}

fn single<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<SessionRecord, SessionError> {
    let mut record = SessionRecord::new();
    insert(&mut record, key, value)?;
    Ok(record)
}

fn invalid(session_id: &str, reason: String) -> BrickworkError {
    SessionError::InvalidRecord {
        session_id: session_id.to_string(),
        reason,
    }
    .into()
}

fn enabled_count(tasks: &[AtomicTask]) -> u32 {
    u32::try_from(tasks.iter().filter(|task| task.enabled).count()).unwrap_or(u32::MAX)
}
