//! Dependency-respecting topological order with a foundational bias.

use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::patterns::FOUNDATIONAL_KEYWORDS;
use crate::text::PhraseSet;
use crate::types::AtomicTask;

static FOUNDATIONAL: Lazy<PhraseSet> = Lazy::new(|| PhraseSet::whole_words(FOUNDATIONAL_KEYWORDS));

/// Whether the task reads like groundwork (requirements, scope, methodology).
#[must_use]
pub fn is_foundational(task: &AtomicTask) -> bool {
    FOUNDATIONAL.is_match(&task.search_text())
}

/// Remove dependencies on ids not in the plan, self-references and repeats.
///
/// Returns the number of references removed.
pub fn prune_dangling(tasks: &mut [AtomicTask]) -> usize {
    let ids: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let mut removed = 0;
    for task in tasks.iter_mut() {
        let before = task.dependencies.len();
        let mut seen = HashSet::new();
        let own = task.id.clone();
        task.dependencies
            .retain(|dep| *dep != own && ids.contains(dep) && seen.insert(dep.clone()));
        let dropped = before - task.dependencies.len();
        if dropped > 0 {
            debug!(task_id = %task.id, dropped, "Pruned dangling dependencies");
        }
        removed += dropped;
    }
    removed
}

/// Order tasks so every task follows its dependencies.
///
/// Among ready tasks, foundational ones go first, then fewer dependencies,
/// then original position. Tasks caught in a cycle are appended in their
/// original order.
#[must_use]
pub fn order_tasks(mut tasks: Vec<AtomicTask>) -> Vec<AtomicTask> {
    prune_dangling(&mut tasks);

    let position: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();
    let mut pending: Vec<usize> = tasks.iter().map(|t| t.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            if let Some(&d) = position.get(dep.as_str()) {
                dependents[d].push(i);
            }
        }
    }

    let key = |i: usize| (!is_foundational(&tasks[i]), tasks[i].dependencies.len(), i);
    let mut ready: BTreeSet<(bool, usize, usize)> = (0..tasks.len())
        .filter(|&i| pending[i] == 0)
        .map(key)
        .collect();

    let mut order = Vec::with_capacity(tasks.len());
    let mut placed = vec![false; tasks.len()];
    while let Some(next) = ready.pop_first() {
        let i = next.2;
        placed[i] = true;
        order.push(i);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(key(dependent));
            }
        }
    }

    let leftover: Vec<usize> = (0..tasks.len()).filter(|&i| !placed[i]).collect();
    if !leftover.is_empty() {
        warn!(
            count = leftover.len(),
            "Dependency cycle detected; appending remaining tasks in original order"
        );
        order.extend(leftover);
    }

    let mut slots: Vec<Option<AtomicTask>> = tasks.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
