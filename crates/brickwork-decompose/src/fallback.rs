//! Deterministic, network-free fallbacks for generation failures.

use tracing::info;

use brickwork_utils::types::{Constitution, ProjectMode};

use crate::patterns::{KEYWORD_TEMPLATES, TaskTemplate, default_council, mode_templates};
use crate::text::PhraseSet;
use crate::types::{AtomicTask, CouncilProposal, Specialist};

/// Upper bound on keyword-triggered fallback tasks.
const MAX_FALLBACK_TASKS: usize = 8;

/// Build a small chained plan from goal keywords, or the mode's default steps.
///
/// Keyword templates only apply in software and general modes; other modes
/// always use their own defaults so no software steps leak into them.
#[must_use]
pub fn fallback_tasks(goal: &str, constitution: &Constitution, domain: &str) -> Vec<AtomicTask> {
    let mode = constitution.mode;
    let goal = goal.to_lowercase();

    let mut templates: Vec<&TaskTemplate> = Vec::new();
    if matches!(mode, ProjectMode::Software | ProjectMode::General) {
        for (keywords, group) in KEYWORD_TEMPLATES {
            if PhraseSet::prefixes(keywords).is_match(&goal) {
                templates.extend(group.iter());
            }
        }
    }
    templates.truncate(MAX_FALLBACK_TASKS);

    let source = if templates.is_empty() {
        templates.extend(mode_templates(mode).iter());
        "mode_defaults"
    } else {
        "keyword_templates"
    };
    info!(mode = %mode, source, count = templates.len(), "Using deterministic fallback tasks");

    let mut tasks: Vec<AtomicTask> = Vec::with_capacity(templates.len());
    for (n, (title, instruction, complexity)) in templates.into_iter().enumerate() {
        let mut task = AtomicTask::new(format!("task-{}", n + 1), *title, *instruction, domain, *complexity);
        if let Some(previous) = tasks.last() {
            task.dependencies.push(previous.id.clone());
        }
        tasks.push(task);
    }
    tasks
}

/// Default roster for a mode, used when the council call yields nothing.
#[must_use]
pub fn fallback_council(mode: ProjectMode, domain: &str) -> CouncilProposal {
    let specialists = default_council(mode)
        .iter()
        .map(|(id, role, capabilities)| Specialist {
            id: (*id).to_string(),
            role: (*role).to_string(),
            persona: format!("You are the {role} on this {domain} project."),
            capabilities: capabilities.iter().map(|c| (*c).to_string()).collect(),
            temperature: 0.3,
        })
        .collect();
    CouncilProposal {
        domain: domain.to_string(),
        specialists,
        reasoning: format!("Default {mode} council"),
    }
}
