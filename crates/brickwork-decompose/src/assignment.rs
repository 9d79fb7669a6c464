//! Specialist assignment by capability overlap.

use std::collections::HashSet;

use crate::text::words;
use crate::types::{AtomicTask, CouncilProposal, Specialist};

fn overlap(specialist: &Specialist, task_words: &HashSet<String>) -> usize {
    specialist
        .capabilities
        .iter()
        .chain(std::iter::once(&specialist.role))
        .flat_map(|capability| words(capability))
        .filter(|word| word.len() > 2 && task_words.contains(word))
        .collect::<HashSet<_>>()
        .len()
}

/// Best-matching council member for `task`; the first member on ties.
#[must_use]
pub fn best_specialist<'a>(task: &AtomicTask, council: &'a CouncilProposal) -> Option<&'a Specialist> {
    let task_words: HashSet<String> = words(&task.search_text()).into_iter().collect();
    let mut best: Option<(&Specialist, usize)> = None;
    for specialist in &council.specialists {
        let score = overlap(specialist, &task_words);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((specialist, score));
        }
    }
    best.map(|(specialist, _)| specialist)
}

/// Fill in `assigned_specialist` for every task.
///
/// An existing assignment is kept only when it names a council member.
pub fn assign_specialists(tasks: &mut [AtomicTask], council: &CouncilProposal) {
    for task in tasks.iter_mut() {
        let valid = task
            .assigned_specialist
            .as_deref()
            .is_some_and(|id| council.specialist(id).is_some());
        if valid {
            continue;
        }
        task.assigned_specialist = best_specialist(task, council).map(|s| s.id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::fallback_council;
    use brickwork_utils::types::ProjectMode;

    #[test]
    fn test_picks_capability_match() {
        let council = fallback_council(ProjectMode::Software, "Web");
        let mut tasks = vec![
            AtomicTask::new("a", "Write tests", "Cover the edge case inputs", "Web", 4),
            AtomicTask::new("b", "Implement login", "Implement the login handler", "Web", 6),
            AtomicTask::new("c", "Celebrate", "Order cake", "Web", 1),
        ];
        assign_specialists(&mut tasks, &council);
        assert_eq!(tasks[0].assigned_specialist.as_deref(), Some("qa"));
        assert_eq!(tasks[1].assigned_specialist.as_deref(), Some("backend"));
        assert_eq!(tasks[2].assigned_specialist.as_deref(), Some("architect"));
    }

    #[test]
    fn test_unknown_assignment_replaced() {
        let council = fallback_council(ProjectMode::Software, "Web");
        let mut task = AtomicTask::new("a", "Write tests", "Cover each edge case", "Web", 4);
        task.assigned_specialist = Some("ghost".into());
        assign_specialists(std::slice::from_mut(&mut task), &council);
        assert_eq!(task.assigned_specialist.as_deref(), Some("qa"));

        task.assigned_specialist = Some("architect".into());
        assign_specialists(std::slice::from_mut(&mut task), &council);
        assert_eq!(task.assigned_specialist.as_deref(), Some("architect"));
    }

    #[test]
    fn test_empty_council_leaves_unassigned() {
        let council = CouncilProposal {
            domain: "x".into(),
            specialists: Vec::new(),
            reasoning: String::new(),
        };
        let mut task = AtomicTask::new("a", "t", "i", "x", 1);
        assign_specialists(std::slice::from_mut(&mut task), &council);
        assert!(task.assigned_specialist.is_none());
    }
}
