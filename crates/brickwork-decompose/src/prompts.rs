//! Prompt text for each decomposition stage.
//!
//! Every prompt asks the model to reason in prose first and commit the answer
//! in a fenced YAML block, which the Soft-Strict extractor reads.

use std::fmt::Write as _;

use brickwork_utils::types::Constitution;

use crate::types::{AtomicTask, CouncilProposal, DomainClassification};

pub const SYSTEM_PLANNER: &str = "You are a senior planner who breaks goals into small, \
verifiable units of work. Think briefly in prose, then commit your final answer in a \
single ```yaml fenced block. Do not put anything after the block.";

pub fn classify(goal: &str, constitution: &Constitution) -> String {
    format!(
        "{context}\nGOAL: {goal}\n\n\
         Classify the goal. Commit:\n\
         ```yaml\n\
         domain: <short domain name>\n\
         subDomain: <optional narrower area>\n\
         expertise:\n  - <skill>\n\
         confidence: <0.0-1.0>\n\
         ```",
        context = constitution.context_block(),
    )
}

pub fn council(goal: &str, constitution: &Constitution, classification: &DomainClassification) -> String {
    format!(
        "{context}\nGOAL: {goal}\nDOMAIN: {domain}\n\n\
         Propose 3-5 specialists who together can deliver the goal. Commit:\n\
         ```yaml\n\
         reasoning: <one sentence>\n\
         specialists:\n  \
           - id: <kebab-case id>\n    \
             role: <role title>\n    \
             persona: <one sentence>\n    \
             capabilities: [<keyword>, <keyword>]\n    \
             temperature: <0.0-1.0>\n\
         ```",
        context = constitution.context_block(),
        domain = classification.domain,
    )
}

pub fn tasks(goal: &str, constitution: &Constitution, council: &CouncilProposal) -> String {
    let mut roster = String::new();
    for specialist in &council.specialists {
        let _ = writeln!(roster, "- {}: {}", specialist.id, specialist.role);
    }
    format!(
        "{context}\nGOAL: {goal}\n\nSPECIALISTS:\n{roster}\n\
         Break the goal into atomic tasks. Each task has exactly one action and one \
         deliverable, an instruction under 500 characters, and lists the ids of tasks \
         it depends on. Commit:\n\
         ```yaml\n\
         tasks:\n  \
           - id: task-1\n    \
             title: <short title>\n    \
             instruction: <one action, one deliverable>\n    \
             complexity: <1-10>\n    \
             dependencies: []\n    \
             assignedSpecialist: <specialist id>\n\
         ```",
        context = constitution.context_block(),
    )
}

pub fn split(task: &AtomicTask, constitution: &Constitution) -> String {
    let issues = if task.atomicity_issues.is_empty() {
        "none recorded".to_string()
    } else {
        task.atomicity_issues.join("; ")
    };
    format!(
        "{context}\nTASK: {title}\nINSTRUCTION: {instruction}\nPROBLEMS: {issues}\n\n\
         This task is not atomic. Split it into 2-4 sub-tasks, in execution order, each \
         with exactly one action and one deliverable. Stay within the project mode \
         above. Commit:\n\
         ```yaml\n\
         tasks:\n  \
           - title: <short title>\n    \
             instruction: <one action, one deliverable>\n    \
             complexity: <1-10>\n\
         ```",
        context = constitution.context_block(),
        title = task.title,
        instruction = task.instruction,
    )
}
