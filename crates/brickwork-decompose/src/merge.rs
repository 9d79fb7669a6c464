//! Near-duplicate task merging.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::atomicity;
use crate::text::words;
use crate::types::AtomicTask;

fn token_set(task: &AtomicTask) -> HashSet<String> {
    words(&format!("{} {}", task.title, task.instruction))
        .into_iter()
        .filter(|w| w.len() > 2)
        .collect()
}

/// Token-set Jaccard overlap of two tasks' title and instruction.
///
/// Words of two characters or fewer are ignored. Two tasks with no
/// tokens at all have overlap 0.
#[must_use]
pub fn jaccard(a: &AtomicTask, b: &AtomicTask) -> f64 {
    set_jaccard(&token_set(a), &token_set(b))
}

fn set_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Collapse tasks whose overlap is at least `threshold`.
///
/// The higher-scoring task survives (the earlier one on ties). Every
/// dependency on a dropped id is rewritten to the survivor, duplicates and
/// self-references are removed. Returns the number of tasks dropped.
pub fn merge_duplicates(tasks: &mut Vec<AtomicTask>, threshold: f64) -> usize {
    let tokens: Vec<_> = tasks.iter().map(token_set).collect();
    let scores: Vec<_> = tasks.iter().map(atomicity::score).collect();
    let mut dropped = vec![false; tasks.len()];
    let mut replaced_by: HashMap<String, String> = HashMap::new();

    for i in 0..tasks.len() {
        for j in (i + 1)..tasks.len() {
            if dropped[i] {
                break;
            }
            if dropped[j] || set_jaccard(&tokens[i], &tokens[j]) < threshold {
                continue;
            }
            let (keep, drop) = if scores[j] > scores[i] { (j, i) } else { (i, j) };
            dropped[drop] = true;
            info!(
                kept = %tasks[keep].id,
                dropped = %tasks[drop].id,
                "Merged near-duplicate tasks"
            );
            replaced_by.insert(tasks[drop].id.clone(), tasks[keep].id.clone());
        }
    }

    let merged = dropped.iter().filter(|d| **d).count();
    if merged == 0 {
        return 0;
    }

    let mut index = 0;
    tasks.retain(|_| {
        let keep = !dropped[index];
        index += 1;
        keep
    });

    for task in tasks.iter_mut() {
        let mut seen = HashSet::new();
        let deps = std::mem::take(&mut task.dependencies);
        task.dependencies = deps
            .into_iter()
            .map(|dep| resolve(&replaced_by, dep))
            .filter(|dep| *dep != task.id && seen.insert(dep.clone()))
            .collect();
    }

    merged
}

/// Follow the replacement chain to the surviving id.
fn resolve(replaced_by: &HashMap<String, String>, mut id: String) -> String {
    // Each id is dropped at most once, so the chain is acyclic.
    while let Some(next) = replaced_by.get(&id) {
        id = next.clone();
    }
    id
}
