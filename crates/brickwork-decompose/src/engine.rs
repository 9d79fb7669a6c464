//! Goal-to-task-graph pipeline.
//!
//! Stages are exposed individually so a resumed session can replay only the
//! ones it has not persisted yet. Every stage degrades to a deterministic
//! fallback when the model call fails or parses to nothing; the only error
//! that escapes is dispatch exhaustion with zero attempts.

use std::collections::{HashSet, VecDeque};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use brickwork_config::ProviderEndpoint;
use brickwork_llm::{CompletionRequest, Dispatcher};
use brickwork_utils::error::DecomposeError;
use brickwork_utils::logging::DecompositionStats;
use brickwork_utils::types::Constitution;

use crate::assignment::assign_specialists;
use crate::types::{
    AtomicTask, CouncilProposal, DecompositionLimits, DomainClassification, PlanResult,
    Specialist, StopReason,
};
use crate::{atomicity, drift, fallback, merge, ordering, prompts, routing};

/// Most sub-tasks kept from one split.
const MAX_SPLIT_WAYS: usize = 4;
const MIN_SPLIT_WAYS: usize = 2;
const DEFAULT_COMPLEXITY: f64 = 5.0;

/// Task as a model writes it; every field but the title is optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDraft {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default, alias = "description")]
    instruction: String,
    #[serde(default)]
    complexity: Option<f64>,
    #[serde(default, alias = "dependsOn", alias = "depends_on")]
    dependencies: Vec<String>,
    #[serde(default, alias = "assigned_specialist", alias = "specialist")]
    assigned_specialist: Option<String>,
}

impl TaskDraft {
    fn complexity(&self) -> u8 {
        let raw = self.complexity.unwrap_or(DEFAULT_COMPLEXITY);
        if raw.is_finite() {
            raw.round().clamp(1.0, 10.0) as u8
        } else {
            DEFAULT_COMPLEXITY as u8
        }
    }

    fn instruction(&self) -> &str {
        if self.instruction.trim().is_empty() {
            &self.title
        } else {
            &self.instruction
        }
    }
}

#[derive(Debug, Deserialize)]
struct CouncilDraft {
    #[serde(default)]
    specialists: Vec<SpecialistDraft>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct SpecialistDraft {
    #[serde(default)]
    id: Option<String>,
    role: String,
    #[serde(default)]
    persona: String,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    temperature: Option<f32>,
}

/// Output of the refinement queue.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineOutcome {
    pub tasks: Vec<AtomicTask>,
    pub stop_reason: StopReason,
    pub stats: DecompositionStats,
}

/// One pending split in the refinement queue.
#[derive(Debug)]
struct QueueItem {
    id: String,
    depth: usize,
    /// Consecutive splits on this branch that failed to raise the score
    stall: usize,
}

/// Decomposes goals into dependency-ordered atomic tasks.
///
/// # Example
///
/// ```rust,no_run
/// use brickwork_config::Config;
/// use brickwork_decompose::DecompositionEngine;
/// use brickwork_llm::{Dispatcher, PenaltyBox};
/// use brickwork_utils::types::{Constitution, ProjectMode};
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = Config::discover()?;
/// let dispatcher = Dispatcher::from_config(&config, PenaltyBox::default())?;
/// let engine = DecompositionEngine::new(dispatcher, config.endpoints().to_vec())
///     .with_limits((&config.decomposition).into());
///
/// let constitution = Constitution::new("Web", ProjectMode::Software);
/// let plan = engine.run_full_decomposition("Build a login system", &constitution).await?;
/// println!("{} tasks, stopped: {}", plan.tasks.len(), plan.stop_reason);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DecompositionEngine {
    dispatcher: Dispatcher,
    endpoints: Vec<ProviderEndpoint>,
    limits: DecompositionLimits,
}

impl DecompositionEngine {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, endpoints: Vec<ProviderEndpoint>) -> Self {
        Self {
            dispatcher,
            endpoints,
            limits: DecompositionLimits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: DecompositionLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn limits(&self) -> &DecompositionLimits {
        &self.limits
    }

    /// Structured call that degrades every non-fatal failure to `None`.
    async fn structured<T: DeserializeOwned>(
        &self,
        request: CompletionRequest,
        expected_field: Option<&str>,
    ) -> Result<Option<T>, DecomposeError> {
        let request = request.with_system(prompts::SYSTEM_PLANNER);
        match self
            .dispatcher
            .dispatch_structured::<T>(&self.endpoints, &request, expected_field)
            .await
        {
            Ok(structured) => Ok(structured.extraction.data),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(request = %request.label, error = %e, "Model call failed; using fallback");
                Ok(None)
            }
        }
    }

    /// Map the goal to a domain. Never fails short of fatal exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`DecomposeError::Dispatch`] when every endpoint is penalized.
    pub async fn classify_domain(
        &self,
        goal: &str,
        constitution: &Constitution,
    ) -> Result<DomainClassification, DecomposeError> {
        let request = CompletionRequest::new("classify_domain", prompts::classify(goal, constitution))
            .with_temperature(self.limits.base_temperature);
        let classification = match self.structured::<DomainClassification>(request, None).await? {
            Some(mut c) if !c.domain.trim().is_empty() => {
                c.confidence = if c.confidence.is_finite() {
                    c.confidence.clamp(0.0, 1.0)
                } else {
                    0.5
                };
                c
            }
            _ => {
                info!("Domain classification unavailable; defaulting to General");
                DomainClassification::general()
            }
        };
        debug!(
            domain = %classification.domain,
            confidence = classification.confidence,
            "Domain classified"
        );
        Ok(classification)
    }

    /// Propose the specialist roster, or the mode's default council.
    ///
    /// # Errors
    ///
    /// Returns [`DecomposeError::Dispatch`] when every endpoint is penalized.
    pub async fn propose_council(
        &self,
        goal: &str,
        constitution: &Constitution,
        classification: &DomainClassification,
    ) -> Result<CouncilProposal, DecomposeError> {
        let request = CompletionRequest::new(
            "propose_council",
            prompts::council(goal, constitution, classification),
        )
        .with_temperature(self.limits.base_temperature);

        let draft = self.structured::<CouncilDraft>(request, None).await?;
        let specialists = draft
            .as_ref()
            .map(|d| specialists_from_drafts(&d.specialists))
            .unwrap_or_default();
        if specialists.is_empty() {
            info!(mode = %constitution.mode, "No council proposed; using default roster");
            return Ok(fallback::fallback_council(constitution.mode, &classification.domain));
        }
        Ok(CouncilProposal {
            domain: classification.domain.clone(),
            specialists,
            reasoning: draft.map(|d| d.reasoning).unwrap_or_default(),
        })
    }

    /// Generate the initial task list.
    ///
    /// An empty answer is retried once at the exploratory temperature; a
    /// second empty answer falls back to deterministic keyword templates.
    ///
    /// # Errors
    ///
    /// Returns [`DecomposeError::Dispatch`] when every endpoint is penalized.
    pub async fn generate_tasks(
        &self,
        goal: &str,
        constitution: &Constitution,
        council: &CouncilProposal,
    ) -> Result<Vec<AtomicTask>, DecomposeError> {
        let prompt = prompts::tasks(goal, constitution, council);
        for temperature in [self.limits.base_temperature, self.limits.retry_temperature] {
            let request = CompletionRequest::new("generate_tasks", prompt.clone())
                .with_temperature(temperature);
            let drafts = self
                .structured::<Vec<TaskDraft>>(request, Some("tasks"))
                .await?
                .unwrap_or_default();
            let mut tasks = tasks_from_drafts(drafts, &council.domain);
            if !tasks.is_empty() {
                for task in &mut tasks {
                    atomicity::validate(task);
                }
                info!(count = tasks.len(), temperature, "Initial tasks generated");
                return Ok(tasks);
            }
            warn!(temperature, "Task generation returned no tasks");
        }

        let mut tasks = fallback::fallback_tasks(goal, constitution, &council.domain);
        for task in &mut tasks {
            atomicity::validate(task);
        }
        Ok(tasks)
    }

    /// Split non-atomic tasks through a bounded work queue.
    ///
    /// Terminates on whichever comes first: an empty queue, the iteration
    /// budget, or the task budget. Depth and per-branch stall counters stop
    /// individual branches without ending the run.
    ///
    /// # Errors
    ///
    /// Returns [`DecomposeError::Dispatch`] when every endpoint is penalized.
    pub async fn refine(
        &self,
        mut tasks: Vec<AtomicTask>,
        constitution: &Constitution,
    ) -> Result<RefineOutcome, DecomposeError> {
        let limits = &self.limits;
        let mut stats = DecompositionStats::default();

        for task in &mut tasks {
            atomicity::validate(task);
        }

        if tasks.len() > limits.max_tasks {
            warn!(
                count = tasks.len(),
                max_tasks = limits.max_tasks,
                "Initial plan exceeds task budget; truncating"
            );
            tasks.truncate(limits.max_tasks);
            return Ok(RefineOutcome {
                tasks,
                stop_reason: StopReason::MaxTasks,
                stats,
            });
        }

        let mut queue: VecDeque<QueueItem> = tasks
            .iter()
            .filter(|t| !t.is_atomic)
            .map(|t| QueueItem {
                id: t.id.clone(),
                depth: 0,
                stall: 0,
            })
            .collect();
        let mut frozen = false;

        let stop_reason = loop {
            if queue.is_empty() {
                break if frozen {
                    StopReason::StallLimit
                } else {
                    StopReason::Completed
                };
            }
            if stats.iterations >= limits.max_iterations {
                break StopReason::MaxIterations;
            }
            let Some(item) = queue.pop_front() else {
                continue;
            };
            stats.iterations += 1;

            let Some(position) = tasks.iter().position(|t| t.id == item.id) else {
                continue;
            };
            if item.depth >= limits.max_depth {
                debug!(task_id = %item.id, depth = item.depth, "Max depth reached; accepting task");
                continue;
            }
            if item.stall >= limits.stall_limit {
                info!(task_id = %item.id, stall = item.stall, "Split stalled; freezing branch");
                frozen = true;
                continue;
            }

            let parent = tasks[position].clone();
            let Some(mut children) = self.split_task(&parent, constitution).await? else {
                continue;
            };

            let rejected = drift::filter_drifted(&mut children, constitution.mode);
            stats.drift_rejections += rejected;
            if children.len() < MIN_SPLIT_WAYS {
                debug!(task_id = %parent.id, "Too few sub-tasks survived the drift filter");
                continue;
            }
            children.truncate(MAX_SPLIT_WAYS);

            if tasks.len() - 1 + children.len() > limits.max_tasks {
                break StopReason::MaxTasks;
            }

            let existing: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
            let child_ids = wire_children(&parent, &mut children, &existing);

            let parent_score = atomicity::score(&parent);
            let mean_child_score =
                children.iter().map(atomicity::score).sum::<f64>() / children.len() as f64;
            let stall = if mean_child_score - parent_score < limits.stall_epsilon {
                stats.stall_events += 1;
                debug!(
                    task_id = %parent.id,
                    parent_score,
                    mean_child_score,
                    "Split did not improve atomicity"
                );
                item.stall + 1
            } else {
                0
            };

            if let Some(last) = child_ids.last() {
                for task in &mut tasks {
                    for dep in &mut task.dependencies {
                        if *dep == parent.id {
                            dep.clone_from(last);
                        }
                    }
                }
            }

            for child in children.iter().filter(|c| !c.is_atomic) {
                queue.push_back(QueueItem {
                    id: child.id.clone(),
                    depth: item.depth + 1,
                    stall,
                });
            }
            stats.splits += 1;
            info!(
                task_id = %parent.id,
                into = children.len(),
                depth = item.depth + 1,
                "Split non-atomic task"
            );
            tasks.splice(position..=position, children);
        };

        info!(
            stop_reason = %stop_reason,
            iterations = stats.iterations,
            tasks = tasks.len(),
            "Refinement stopped"
        );
        Ok(RefineOutcome {
            tasks,
            stop_reason,
            stats,
        })
    }

    /// Ask the model for a 2-4 way split. `None` keeps the parent as is.
    async fn split_task(
        &self,
        parent: &AtomicTask,
        constitution: &Constitution,
    ) -> Result<Option<Vec<AtomicTask>>, DecomposeError> {
        let request = CompletionRequest::new("split_task", prompts::split(parent, constitution))
            .with_temperature(self.limits.base_temperature);
        let drafts = self
            .structured::<Vec<TaskDraft>>(request, Some("tasks"))
            .await?
            .unwrap_or_default();
        if drafts.len() < MIN_SPLIT_WAYS {
            debug!(task_id = %parent.id, count = drafts.len(), "Split produced too few sub-tasks");
            return Ok(None);
        }
        let children = drafts
            .iter()
            .map(|draft| {
                let mut child = AtomicTask::new(
                    String::new(),
                    draft.title.trim(),
                    draft.instruction().trim(),
                    parent.domain.clone(),
                    draft.complexity(),
                );
                child.assigned_specialist.clone_from(&parent.assigned_specialist);
                child
            })
            .collect();
        Ok(Some(children))
    }

    /// Merge near-duplicates, order by dependency and refresh routing.
    ///
    /// Returns the ordered tasks and how many duplicates were merged.
    #[must_use]
    pub fn post_process(&self, mut tasks: Vec<AtomicTask>, threshold: f64) -> (Vec<AtomicTask>, usize) {
        let merged = merge::merge_duplicates(&mut tasks, threshold);
        let mut ordered = ordering::order_tasks(tasks);
        routing::apply_routing(&mut ordered);
        (ordered, merged)
    }

    /// Run every stage and return the ordered, assigned plan.
    ///
    /// # Errors
    ///
    /// Returns [`DecomposeError::Dispatch`] when every endpoint is penalized.
    pub async fn run_full_decomposition(
        &self,
        goal: &str,
        constitution: &Constitution,
    ) -> Result<PlanResult, DecomposeError> {
        let classification = self.classify_domain(goal, constitution).await?;
        let council = self.propose_council(goal, constitution, &classification).await?;
        let tasks = self.generate_tasks(goal, constitution, &council).await?;
        let plan = self.finish_plan(goal, constitution, classification, council, tasks).await?;
        plan.stats.log_summary(goal.chars().count(), plan.tasks.len());
        Ok(plan)
    }

    /// Refine, post-process and assign an already generated task list.
    ///
    /// # Errors
    ///
    /// Returns [`DecomposeError::Dispatch`] when every endpoint is penalized.
    pub async fn finish_plan(
        &self,
        goal: &str,
        constitution: &Constitution,
        classification: DomainClassification,
        council: CouncilProposal,
        tasks: Vec<AtomicTask>,
    ) -> Result<PlanResult, DecomposeError> {
        let refined = self.refine(tasks, constitution).await?;
        let (mut tasks, merged) = self.post_process(refined.tasks, self.limits.duplicate_threshold);
        assign_specialists(&mut tasks, &council);

        let mut stats = refined.stats;
        stats.merged_duplicates = merged;
        Ok(PlanResult {
            goal: goal.to_string(),
            classification,
            council,
            tasks,
            stop_reason: refined.stop_reason,
            stats,
        })
    }
}

/// Assign child ids, chain children in order and hook the first child to the
/// parent's dependencies. Returns the child ids.
fn wire_children(parent: &AtomicTask, children: &mut [AtomicTask], existing: &HashSet<String>) -> Vec<String> {
    let mut ids = Vec::with_capacity(children.len());
    for (n, child) in children.iter_mut().enumerate() {
        child.id = unique_id(&format!("{}.{}", parent.id, n + 1), existing);
        child.dependencies = match ids.last() {
            Some(previous) => vec![String::clone(previous)],
            None => parent.dependencies.clone(),
        };
        atomicity::validate(child);
        ids.push(child.id.clone());
    }
    ids
}

fn unique_id(base: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|k| format!("{base}-{k}"))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn tasks_from_drafts(drafts: Vec<TaskDraft>, domain: &str) -> Vec<AtomicTask> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(drafts.len());
    for (n, draft) in drafts.into_iter().enumerate() {
        if draft.title.trim().is_empty() {
            continue;
        }
        let id = draft
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && !seen.contains(*id))
            .map_or_else(|| format!("task-{}", n + 1), str::to_string);
        let id = unique_id(&id, &seen);
        seen.insert(id.clone());

        let mut task = AtomicTask::new(
            id,
            draft.title.trim(),
            draft.instruction().trim(),
            domain,
            draft.complexity(),
        )
        .with_dependencies(draft.dependencies);
        task.assigned_specialist = draft.assigned_specialist;
        tasks.push(task);
    }
    tasks
}

fn specialists_from_drafts(drafts: &[SpecialistDraft]) -> Vec<Specialist> {
    let mut seen = HashSet::new();
    drafts
        .iter()
        .filter(|d| !d.role.trim().is_empty())
        .filter_map(|d| {
            let id = d
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map_or_else(|| slug(&d.role), str::to_string);
            seen.insert(id.clone()).then(|| Specialist {
                id,
                role: d.role.trim().to_string(),
                persona: d.persona.clone(),
                capabilities: d.capabilities.clone(),
                temperature: d
                    .temperature
                    .filter(|t| t.is_finite())
                    .map_or(0.3, |t| t.clamp(0.0, 2.0)),
            })
        })
        .collect()
}

fn slug(role: &str) -> String {
    crate::text::words(role).join("-")
}
