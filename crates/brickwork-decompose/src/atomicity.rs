//! Atomicity validator and composite score.
//!
//! A task is atomic when its instruction names one action with one
//! deliverable. Each failed heuristic is recorded as an issue string on the
//! task; any issue flips `is_atomic` to false.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::patterns::{ACTION_VERBS, COMPOUND_PATTERNS, MAX_INSTRUCTION_CHARS, VAGUE_MARKERS};
use crate::text::{PhraseSet, words};
use crate::types::AtomicTask;

/// Distinct action verbs at or above this count make a task compound.
pub const MAX_DISTINCT_VERBS: usize = 3;

static COMPOUND: Lazy<PhraseSet> = Lazy::new(|| PhraseSet::whole_words(COMPOUND_PATTERNS));
static VAGUE: Lazy<PhraseSet> = Lazy::new(|| PhraseSet::whole_words(VAGUE_MARKERS));

/// Distinct action verbs in `text`, matching simple inflections.
#[must_use]
pub fn action_verbs(text: &str) -> BTreeSet<&'static str> {
    words(text)
        .iter()
        .filter_map(|word| ACTION_VERBS.iter().copied().find(|verb| is_inflection(word, verb)))
        .collect()
}

fn is_inflection(word: &str, verb: &str) -> bool {
    let Some(rest) = word.strip_prefix(verb) else {
        // "create" -> "creating"
        return verb
            .strip_suffix('e')
            .and_then(|stem| word.strip_prefix(stem))
            .is_some_and(|rest| rest == "ing");
    };
    matches!(rest, "" | "s" | "es" | "d" | "ed" | "ing")
}

/// Heuristic issues for one instruction, in a stable order.
#[must_use]
pub fn detect_issues(instruction: &str) -> Vec<String> {
    let mut issues = Vec::new();
    let lowered = instruction.to_lowercase();

    let verbs = action_verbs(&lowered);
    if verbs.len() >= MAX_DISTINCT_VERBS {
        let list: Vec<_> = verbs.into_iter().collect();
        issues.push(format!(
            "multiple actions: {} distinct action verbs ({})",
            list.len(),
            list.join(", ")
        ));
    }

    for pattern in COMPOUND.matches(&lowered) {
        issues.push(format!("compound instruction: contains '{pattern}'"));
    }

    for marker in VAGUE.matches(&lowered) {
        issues.push(format!("vague scope: contains '{marker}'"));
    }

    let chars = instruction.chars().count();
    if chars > MAX_INSTRUCTION_CHARS {
        issues.push(format!(
            "instruction too long: {chars} chars (max {MAX_INSTRUCTION_CHARS})"
        ));
    }

    issues
}

/// Re-validate `task` in place. Returns whether it is atomic.
pub fn validate(task: &mut AtomicTask) -> bool {
    task.atomicity_issues = detect_issues(&task.instruction);
    task.is_atomic = task.atomicity_issues.is_empty();
    if !task.is_atomic {
        debug!(
            task_id = %task.id,
            issues = ?task.atomicity_issues,
            "Task failed atomicity validation"
        );
    }
    task.is_atomic
}

/// 0-1 composite: issue count (0.4), instruction length (0.3),
/// dependency count (0.15), title length (0.15). Higher is more atomic.
#[must_use]
pub fn score(task: &AtomicTask) -> f64 {
    let issues = detect_issues(&task.instruction).len() as f64;
    let issue_part = 1.0 / (1.0 + issues);

    let chars = task.instruction.chars().count() as f64;
    let length_part = if chars <= 200.0 {
        1.0
    } else {
        (1.0 - (chars - 200.0) / 800.0).max(0.0)
    };

    let deps = task.dependencies.len().min(10) as f64;
    let dependency_part = 1.0 - deps / 10.0;

    let title_words = task.title.split_whitespace().count() as f64;
    let title_part = if title_words <= 8.0 {
        1.0
    } else {
        (1.0 - (title_words - 8.0) / 12.0).max(0.0)
    };

    0.4 * issue_part + 0.3 * length_part + 0.15 * dependency_part + 0.15 * title_part
}
