//! Dependency-graph scan: dangling references and cycles.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use brickwork_decompose::AtomicTask;

use crate::types::{GapCategory, GapSeverity, IdentifiedGap};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

struct CycleFinder<'a> {
    tasks: &'a [AtomicTask],
    index: HashMap<&'a str, usize>,
    marks: Vec<Mark>,
    stack: Vec<usize>,
    cycles: Vec<Vec<usize>>,
    seen: HashSet<BTreeSet<usize>>,
}

impl<'a> CycleFinder<'a> {
    fn new(tasks: &'a [AtomicTask]) -> Self {
        Self {
            tasks,
            index: tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect(),
            marks: vec![Mark::Unvisited; tasks.len()],
            stack: Vec::new(),
            cycles: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn visit(&mut self, node: usize) {
        self.marks[node] = Mark::OnStack;
        self.stack.push(node);
        let tasks = self.tasks;
        for dep in &tasks[node].dependencies {
            let Some(&next) = self.index.get(dep.as_str()) else {
                continue;
            };
            match self.marks[next] {
                Mark::Unvisited => self.visit(next),
                Mark::OnStack => {
                    let start = self.stack.iter().rposition(|&n| n == next).unwrap_or(0);
                    let cycle = self.stack[start..].to_vec();
                    if self.seen.insert(cycle.iter().copied().collect()) {
                        self.cycles.push(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        self.stack.pop();
        self.marks[node] = Mark::Done;
    }

    fn run(mut self) -> Vec<Vec<usize>> {
        for node in 0..self.tasks.len() {
            if self.marks[node] == Mark::Unvisited {
                self.visit(node);
            }
        }
        self.cycles
    }
}

/// Cycles as id lists, each in traversal order and reported once.
#[must_use]
pub fn find_cycles(tasks: &[AtomicTask]) -> Vec<Vec<String>> {
    CycleFinder::new(tasks)
        .run()
        .into_iter()
        .map(|cycle| cycle.into_iter().map(|i| tasks[i].id.clone()).collect())
        .collect()
}

/// Gaps for references to unknown task ids (major) and cycles (critical).
#[must_use]
pub fn scan(tasks: &[AtomicTask]) -> Vec<IdentifiedGap> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut gaps = Vec::new();

    for task in tasks {
        for dep in task.dependencies.iter().filter(|d| !ids.contains(d.as_str())) {
            let title = format!("Dangling dependency {} -> {dep}", task.id);
            debug!(task_id = %task.id, missing = %dep, "Dependency references unknown task");
            gaps.push(IdentifiedGap {
                id: IdentifiedGap::derive_id(GapCategory::Dependency, &title),
                severity: GapSeverity::Major,
                category: GapCategory::Dependency,
                title,
                description: format!("Task '{}' depends on '{dep}', which is not in the plan.", task.id),
                affected_tasks: vec![task.id.clone()],
                suggested_fix: format!("Add the missing task '{dep}' or drop the reference."),
            });
        }
    }

    for cycle in find_cycles(tasks) {
        let path = cycle
            .iter()
            .chain(cycle.first())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        let title = format!("Dependency cycle {path}");
        debug!(cycle = %path, "Dependency cycle detected");
        gaps.push(IdentifiedGap {
            id: IdentifiedGap::derive_id(GapCategory::Dependency, &title),
            severity: GapSeverity::Critical,
            category: GapCategory::Dependency,
            title,
            description: format!("Tasks {path} depend on each other; none can start."),
            affected_tasks: cycle,
            suggested_fix: "Remove one dependency edge to break the cycle.".to_string(),
        });
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> AtomicTask {
        AtomicTask::new(id, id, id, "Web", 3).with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_clean_graph_has_no_gaps() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a", "b"])];
        assert!(scan(&tasks).is_empty());
    }

    #[test]
    fn test_dangling_reference() {
        let gaps = scan(&[task("a", &["ghost"])]);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].severity, GapSeverity::Major);
        assert_eq!(gaps[0].affected_tasks, vec!["a"]);
    }

    #[test]
    fn test_cycle_reported_once() {
        let tasks = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"]), task("d", &["a"])];
        let cycles = find_cycles(&tasks);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);

        let gaps = scan(&tasks);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].severity, GapSeverity::Critical);
        assert!(gaps[0].title.starts_with("Dependency cycle a -> c -> b -> a"));
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let cycles = find_cycles(&[task("a", &["a"])]);
        assert_eq!(cycles, vec![vec!["a".to_string()]]);
    }
}
