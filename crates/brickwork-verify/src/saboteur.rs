//! Red-team gap detector.
//!
//! Three independent passes are unioned: an adversarial model call, the
//! mode checklist, and the dependency-graph scan. Critical and major gaps
//! become [`MissingBrick`]s that are spliced back into the plan.

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::Deserialize;
use tracing::{debug, info, warn};

use brickwork_config::ProviderEndpoint;
use brickwork_decompose::drift::foreign_markers;
use brickwork_decompose::{AtomicTask, PlanResult, atomicity};
use brickwork_llm::{CompletionRequest, Dispatcher};
use brickwork_utils::error::VerifyError;
use brickwork_utils::types::{Constitution, ProjectMode};

use crate::profiles::ModeProfile;
use crate::types::{
    BrickPriority, GapCategory, GapSeverity, IdentifiedGap, MissingBrick, SaboteurResult,
    normalize_title,
};
use crate::{checklist, graph};

/// Most gaps taken from the adversarial call.
const MAX_MODEL_GAPS: usize = 5;
const SABOTEUR_TEMPERATURE: f32 = 0.7;
const BRICK_TEMPERATURE: f32 = 0.3;

const SYSTEM_SABOTEUR: &str = "You are a red-team reviewer. Assume the plan will fail and find \
out why. Report concrete, specific gaps only. Think briefly, then commit your answer in a \
single ```yaml fenced block.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GapDraft {
    title: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "affected_tasks")]
    affected_tasks: Vec<String>,
    #[serde(default, alias = "suggested_fix", alias = "fix")]
    suggested_fix: String,
}

impl GapDraft {
    fn into_gap(self, known_ids: &HashSet<&str>) -> Option<IdentifiedGap> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let severity = match self.severity.as_deref().map(|s| s.trim().to_lowercase()).as_deref() {
            Some("critical") => GapSeverity::Critical,
            Some("minor" | "low") => GapSeverity::Minor,
            _ => GapSeverity::Major,
        };
        let category = match self.category.as_deref().map(|s| s.trim().to_lowercase()).as_deref() {
            Some("coverage" | "completeness" | "missing") => GapCategory::Coverage,
            Some("dependency" | "dependencies" | "ordering") => GapCategory::Dependency,
            Some("security") => GapCategory::Security,
            Some("testing" | "test" | "tests") => GapCategory::Testing,
            Some("error_handling" | "error handling" | "errors") => GapCategory::ErrorHandling,
            _ => GapCategory::Other,
        };
        Some(IdentifiedGap {
            id: IdentifiedGap::derive_id(category, &title),
            severity,
            category,
            description: self.description,
            affected_tasks: self
                .affected_tasks
                .into_iter()
                .filter(|id| known_ids.contains(id.as_str()))
                .collect(),
            suggested_fix: self.suggested_fix,
            title,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrickDraft {
    title: String,
    #[serde(default, alias = "description")]
    instruction: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default, alias = "insert_after")]
    insert_after: Option<String>,
    #[serde(default, alias = "insert_before")]
    insert_before: Option<String>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    complexity: Option<f64>,
}

/// 100 minus 20/10/5 per critical/major/minor gap, floored at 0.
#[must_use]
pub fn coverage_score(gaps: &[IdentifiedGap]) -> u8 {
    let penalty: u32 = gaps.iter().map(|g| u32::from(g.severity.penalty())).sum();
    100u32.saturating_sub(penalty) as u8
}

/// Union gap lists, deduplicating by normalized title.
///
/// The first occurrence wins but takes the most severe severity seen.
#[must_use]
pub fn union_gaps(passes: impl IntoIterator<Item = Vec<IdentifiedGap>>) -> Vec<IdentifiedGap> {
    let mut merged: Vec<IdentifiedGap> = Vec::new();
    for gap in passes.into_iter().flatten() {
        let key = normalize_title(&gap.title);
        match merged.iter_mut().find(|g| normalize_title(&g.title) == key) {
            Some(existing) => existing.severity = existing.severity.min(gap.severity),
            None => merged.push(gap),
        }
    }
    merged
}

fn unique_id(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|k| format!("{base}-{k}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Insert bricks as tasks.
///
/// A brick with a known `insert_after` goes right after that task and depends
/// on it; a known `insert_before` goes right before that task, which then
/// depends on the brick. Otherwise critical bricks are prepended in order and
/// the rest appended.
#[must_use]
pub fn splice_bricks(mut tasks: Vec<AtomicTask>, bricks: &[MissingBrick], domain: &str) -> Vec<AtomicTask> {
    let mut taken: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let mut prepend_at = 0usize;

    for brick in bricks {
        let id = unique_id(&brick.id, &taken);
        taken.insert(id.clone());
        let mut task = AtomicTask::new(id, brick.title.clone(), brick.instruction.clone(), domain, brick.complexity);
        atomicity::validate(&mut task);

        let position_of = |id: &Option<String>, tasks: &[AtomicTask]| {
            id.as_deref().and_then(|id| tasks.iter().position(|t| t.id == id))
        };

        let (index, prepended) = if let Some(after) = position_of(&brick.insert_after, &tasks) {
            task.dependencies = vec![tasks[after].id.clone()];
            (after + 1, false)
        } else if let Some(before) = position_of(&brick.insert_before, &tasks) {
            tasks[before].dependencies.push(task.id.clone());
            (before, false)
        } else if brick.priority == BrickPriority::Critical {
            (prepend_at, true)
        } else {
            (tasks.len(), false)
        };

        if prepended || index < prepend_at {
            prepend_at += 1;
        }
        info!(brick_id = %task.id, index, priority = %brick.priority, "Spliced missing brick");
        tasks.insert(index, task);
    }
    tasks
}

/// Replace drifted brick text with the mode's safe template.
fn sanitize(mut brick: MissingBrick, profile: &ModeProfile, ordinal: usize) -> MissingBrick {
    let mode = profile.mode;
    if !foreign_markers(&brick.title, mode).is_empty() {
        brick.title = format!("Close plan gap {ordinal}");
    }
    let markers = foreign_markers(&brick.instruction, mode);
    if !markers.is_empty() {
        debug!(brick_id = %brick.id, markers = ?markers, "Brick instruction drifted; using safe template");
        brick.instruction = profile.safe_instruction_for(&brick.title);
    }
    brick
}

/// Network-free brick for one gap.
fn fallback_brick(gap: &IdentifiedGap, ordinal: usize) -> MissingBrick {
    let instruction = if gap.suggested_fix.trim().is_empty() {
        gap.description.clone()
    } else {
        gap.suggested_fix.clone()
    };
    let insert_before = match gap.category {
        GapCategory::Dependency => gap.affected_tasks.first().cloned(),
        _ => None,
    };
    MissingBrick {
        id: format!("brick-{ordinal}"),
        title: format!("Address: {}", gap.title),
        instruction,
        priority: gap.severity.into(),
        insert_after: None,
        insert_before,
        reason: gap.description.clone(),
        complexity: if gap.severity == GapSeverity::Critical { 6 } else { 5 },
    }
}

/// Adversarial stress tester for plans.
#[derive(Debug, Clone)]
pub struct Saboteur {
    dispatcher: Dispatcher,
    endpoints: Vec<ProviderEndpoint>,
}

impl Saboteur {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, endpoints: Vec<ProviderEndpoint>) -> Self {
        Self {
            dispatcher,
            endpoints,
        }
    }

    fn plan_listing(tasks: &[AtomicTask]) -> String {
        let mut listing = String::new();
        for task in tasks {
            let _ = writeln!(
                listing,
                "- {} [{}] {}: {} (depends on: {})",
                task.id,
                task.routing_path,
                task.title,
                task.instruction,
                if task.dependencies.is_empty() {
                    "none".to_string()
                } else {
                    task.dependencies.join(", ")
                }
            );
        }
        listing
    }

    /// Adversarial pass. Non-fatal failures yield no gaps.
    async fn model_gaps(&self, plan: &PlanResult, constitution: &Constitution) -> Result<Vec<IdentifiedGap>, VerifyError> {
        let prompt = format!(
            "{context}\nGOAL: {goal}\n\nPLAN:\n{listing}\n\
             Find 3-5 concrete gaps: missing steps, unsafe assumptions, ordering problems. Commit:\n\
             ```yaml\n\
             gaps:\n  \
               - title: <short title>\n    \
                 severity: critical | major | minor\n    \
                 category: coverage | dependency | security | testing | error_handling | other\n    \
                 description: <what is missing>\n    \
                 affectedTasks: [<task id>]\n    \
                 suggestedFix: <one sentence>\n\
             ```",
            context = constitution.context_block(),
            goal = plan.goal,
            listing = Self::plan_listing(&plan.tasks),
        );
        let request = CompletionRequest::new("saboteur_gaps", prompt)
            .with_system(SYSTEM_SABOTEUR)
            .with_temperature(SABOTEUR_TEMPERATURE);

        let drafts = match self
            .dispatcher
            .dispatch_structured::<Vec<GapDraft>>(&self.endpoints, &request, Some("gaps"))
            .await
        {
            Ok(structured) => structured.extraction.data.unwrap_or_default(),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Saboteur call failed; relying on deterministic passes");
                Vec::new()
            }
        };

        let known: HashSet<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
        Ok(drafts
            .into_iter()
            .filter_map(|d| d.into_gap(&known))
            .take(MAX_MODEL_GAPS)
            .collect())
    }

    /// Convert serious gaps to bricks, falling back to one brick per gap.
    async fn bricks_for(
        &self,
        gaps: &[&IdentifiedGap],
        plan: &PlanResult,
        constitution: &Constitution,
    ) -> Result<Vec<MissingBrick>, VerifyError> {
        let mut gap_list = String::new();
        for gap in gaps {
            let _ = writeln!(gap_list, "- [{}] {}: {}", gap.severity, gap.title, gap.description);
        }
        let prompt = format!(
            "{context}\nGOAL: {goal}\n\nPLAN:\n{listing}\nGAPS:\n{gap_list}\n\
             Write one missing task per gap. Each has one action and one deliverable. Commit:\n\
             ```yaml\n\
             bricks:\n  \
               - title: <short title>\n    \
                 instruction: <one action, one deliverable>\n    \
                 priority: critical | high | medium | low\n    \
                 insertAfter: <task id, optional>\n    \
                 insertBefore: <task id, optional>\n    \
                 reason: <which gap this closes>\n    \
                 complexity: <1-10>\n\
             ```",
            context = constitution.context_block(),
            goal = plan.goal,
            listing = Self::plan_listing(&plan.tasks),
        );
        let request = CompletionRequest::new("missing_bricks", prompt)
            .with_system(SYSTEM_SABOTEUR)
            .with_temperature(BRICK_TEMPERATURE);

        let drafts = match self
            .dispatcher
            .dispatch_structured::<Vec<BrickDraft>>(&self.endpoints, &request, Some("bricks"))
            .await
        {
            Ok(structured) => structured.extraction.data.unwrap_or_default(),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Brick generation call failed");
                Vec::new()
            }
        };

        let bricks: Vec<MissingBrick> = drafts
            .into_iter()
            .filter(|d| !d.title.trim().is_empty())
            .enumerate()
            .map(|(n, d)| {
                let instruction = if d.instruction.trim().is_empty() {
                    d.title.clone()
                } else {
                    d.instruction
                };
                MissingBrick {
                    id: format!("brick-{}", n + 1),
                    title: d.title.trim().to_string(),
                    instruction,
                    priority: match d.priority.as_deref().map(str::trim) {
                        Some("critical") => BrickPriority::Critical,
                        Some("high") => BrickPriority::High,
                        Some("low") => BrickPriority::Low,
                        _ => BrickPriority::Medium,
                    },
                    insert_after: d.insert_after.filter(|s| !s.trim().is_empty()),
                    insert_before: d.insert_before.filter(|s| !s.trim().is_empty()),
                    reason: d.reason,
                    complexity: d
                        .complexity
                        .filter(|c| c.is_finite())
                        .map_or(5, |c| c.round().clamp(1.0, 10.0) as u8),
                }
            })
            .collect();

        if bricks.is_empty() {
            info!(gaps = gaps.len(), "Using deterministic bricks");
            return Ok(gaps
                .iter()
                .enumerate()
                .map(|(n, gap)| fallback_brick(gap, n + 1))
                .collect());
        }
        Ok(bricks)
    }

    /// Stress-test a plan and return it with gap-filling bricks spliced in.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Dispatch`] when every endpoint is penalized.
    pub async fn stress_test(
        &self,
        plan: &PlanResult,
        constitution: &Constitution,
    ) -> Result<SaboteurResult, VerifyError> {
        let mode: ProjectMode = constitution.mode;
        let model = self.model_gaps(plan, constitution).await?;
        let listed = checklist::scan(&plan.tasks, mode);
        let structural = graph::scan(&plan.tasks);
        debug!(
            model = model.len(),
            checklist = listed.len(),
            graph = structural.len(),
            "Saboteur passes complete"
        );

        let gaps = union_gaps([model, listed, structural]);
        for gap in &gaps {
            info!(
                gap_id = %gap.id,
                severity = %gap.severity,
                category = %gap.category,
                title = %gap.title,
                "Gap detected"
            );
        }

        let serious: Vec<&IdentifiedGap> = gaps.iter().filter(|g| g.severity.warrants_brick()).collect();
        let bricks = if serious.is_empty() {
            Vec::new()
        } else {
            let profile = ModeProfile::for_mode(mode);
            self.bricks_for(&serious, plan, constitution)
                .await?
                .into_iter()
                .enumerate()
                .map(|(n, brick)| sanitize(brick, &profile, n + 1))
                .collect()
        };

        let tasks = splice_bricks(plan.tasks.clone(), &bricks, &plan.classification.domain);
        let coverage = coverage_score(&gaps);
        info!(
            gaps = gaps.len(),
            bricks = bricks.len(),
            coverage_score = coverage,
            "Stress test finished"
        );
        Ok(SaboteurResult {
            gaps,
            bricks,
            tasks,
            coverage_score: coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickwork_decompose::{CouncilProposal, DomainClassification, StopReason};
    use brickwork_llm::PenaltyBox;
    use brickwork_llm::testing::ScriptedBackend;
    use brickwork_utils::logging::DecompositionStats;
    use std::sync::Arc;

    fn gap(title: &str, severity: GapSeverity) -> IdentifiedGap {
        IdentifiedGap {
            id: IdentifiedGap::derive_id(GapCategory::Other, title),
            severity,
            category: GapCategory::Other,
            title: title.into(),
            description: String::new(),
            affected_tasks: Vec::new(),
            suggested_fix: String::new(),
        }
    }

    fn brick(id: &str, priority: BrickPriority) -> MissingBrick {
        MissingBrick {
            id: id.into(),
            title: format!("Brick {id}"),
            instruction: "Write the missing doc".into(),
            priority,
            insert_after: None,
            insert_before: None,
            reason: String::new(),
            complexity: 3,
        }
    }

    fn task(id: &str) -> AtomicTask {
        AtomicTask::new(id, id, id, "Web", 3)
    }

    fn ids(tasks: &[AtomicTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_coverage_score_penalties() {
        assert_eq!(coverage_score(&[]), 100);
        let gaps = vec![
            gap("a", GapSeverity::Critical),
            gap("b", GapSeverity::Major),
            gap("c", GapSeverity::Minor),
        ];
        assert_eq!(coverage_score(&gaps), 65);
        let many: Vec<_> = (0..6).map(|i| gap(&i.to_string(), GapSeverity::Critical)).collect();
        assert_eq!(coverage_score(&many), 0);
    }

    #[test]
    fn test_union_dedupes_and_escalates() {
        let merged = union_gaps([
            vec![gap("Missing testing", GapSeverity::Minor)],
            vec![gap("missing   TESTING!", GapSeverity::Critical), gap("Other", GapSeverity::Minor)],
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].severity, GapSeverity::Critical);
    }

    #[test]
    fn test_splice_positions() {
        let tasks = vec![task("a"), task("b"), task("c")];
        let mut after = brick("x", BrickPriority::High);
        after.insert_after = Some("a".into());
        let mut before = brick("y", BrickPriority::High);
        before.insert_before = Some("c".into());
        let bricks = vec![
            brick("crit1", BrickPriority::Critical),
            after,
            before,
            brick("crit2", BrickPriority::Critical),
            brick("tail", BrickPriority::Low),
        ];
        let spliced = splice_bricks(tasks, &bricks, "Web");
        assert_eq!(ids(&spliced), vec!["crit1", "crit2", "a", "x", "b", "y", "c", "tail"]);
        let x = spliced.iter().find(|t| t.id == "x").unwrap();
        assert_eq!(x.dependencies, vec!["a"]);
        let c = spliced.iter().find(|t| t.id == "c").unwrap();
        assert_eq!(c.dependencies, vec!["y"]);
    }

    #[test]
    fn test_splice_unknown_anchor_and_id_collision() {
        let mut b = brick("a", BrickPriority::Medium);
        b.insert_after = Some("ghost".into());
        let spliced = splice_bricks(vec![task("a")], &[b], "Web");
        assert_eq!(ids(&spliced), vec!["a", "a-2"]);
    }

    #[test]
    fn test_sanitize_replaces_drifted_instruction() {
        let profile = ModeProfile::for_mode(ProjectMode::Research);
        let mut b = brick("x", BrickPriority::High);
        b.title = "Ethics review".into();
        b.instruction = "Deploy a docker container for consent forms".into();
        let clean = sanitize(b, &profile, 1);
        assert_eq!(clean.instruction, "Add the missing research step with cited sources: Ethics review.");
        assert!(foreign_markers(&clean.instruction, ProjectMode::Research).is_empty());
    }

    fn plan(tasks: Vec<AtomicTask>) -> PlanResult {
        PlanResult {
            goal: "Build a login system".into(),
            classification: DomainClassification::general(),
            council: CouncilProposal {
                domain: "General".into(),
                specialists: Vec::new(),
                reasoning: String::new(),
            },
            tasks,
            stop_reason: StopReason::Completed,
            stats: DecompositionStats::default(),
        }
    }

    fn saboteur(backend: Arc<ScriptedBackend>) -> Saboteur {
        let dispatcher = Dispatcher::new(PenaltyBox::default()).with_backend("scripted", backend);
        Saboteur::new(dispatcher, vec![ProviderEndpoint::new("primary", "scripted", "m")])
    }

    #[tokio::test]
    async fn test_stress_test_with_failed_calls_uses_deterministic_passes() {
        let backend = Arc::new(ScriptedBackend::new("s").with_fallback("no yaml"));
        let tasks = vec![
            AtomicTask::new("req", "Define login requirements", "List the password rules", "Web", 3),
            AtomicTask::new("impl", "Implement login", "Implement the login handler", "Web", 6)
                .with_dependencies(["req", "ghost"]),
        ];
        let constitution = Constitution::new("Web", ProjectMode::Software);
        let result = saboteur(backend.clone()).stress_test(&plan(tasks), &constitution).await.unwrap();

        assert!(result.gaps.iter().any(|g| g.category == GapCategory::Dependency));
        assert!(result.gaps.iter().all(|g| g.title != "Missing authentication"));
        assert!(!result.bricks.is_empty());
        assert_eq!(result.tasks.len(), 2 + result.bricks.len());
        assert!(result.coverage_score < 100);
        assert_eq!(backend.calls_for("saboteur_gaps"), 1);
        assert_eq!(backend.calls_for("missing_bricks"), 1);
    }

    #[tokio::test]
    async fn test_model_gaps_are_unioned() {
        let gaps = "```yaml\ngaps:\n  - title: No rate limiting on login\n    severity: critical\n    category: security\n    affectedTasks: [impl, nope]\n    suggestedFix: Add a rate limiter\n```";
        let bricks = "```yaml\nbricks:\n  - title: Add login rate limiting\n    instruction: Limit login attempts per account\n    priority: critical\n    insertAfter: impl\n    complexity: 5\n```";
        let backend = Arc::new(
            ScriptedBackend::new("s")
                .with_route("saboteur_gaps", gaps)
                .with_route("missing_bricks", bricks),
        );
        let tasks = vec![
            AtomicTask::new("req", "Define login requirements", "List the password rules", "Web", 3),
            AtomicTask::new("impl", "Implement login", "Implement the login handler", "Web", 6),
            AtomicTask::new("test", "Test login", "Test wrong password handling and error cases", "Web", 4),
            AtomicTask::new("docs", "Document login", "Write the README section", "Web", 2),
        ];
        let constitution = Constitution::new("Web", ProjectMode::Software);
        let result = saboteur(backend).stress_test(&plan(tasks), &constitution).await.unwrap();

        let security = result.gaps.iter().find(|g| g.category == GapCategory::Security).unwrap();
        assert_eq!(security.affected_tasks, vec!["impl"]);
        assert_eq!(result.bricks.len(), 1);
        assert_eq!(ids(&result.tasks), vec!["req", "impl", "brick-1", "test", "docs"]);
        assert_eq!(result.coverage_score, 80);
    }
}
