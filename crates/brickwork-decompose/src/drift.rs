//! Mode-drift filter.
//!
//! Rejects generated sub-tasks that carry vocabulary foreign to the project
//! mode, e.g. deployment steps inside a research plan. The marker tables are
//! English only, so goals in other languages pass through unfiltered.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use strum::IntoEnumIterator;
use tracing::info;

use brickwork_utils::types::ProjectMode;

use crate::patterns::drift_markers;
use crate::text::PhraseSet;
use crate::types::AtomicTask;

static MARKERS: Lazy<HashMap<ProjectMode, PhraseSet>> = Lazy::new(|| {
    ProjectMode::iter()
        .filter_map(|mode| {
            let table = drift_markers(mode);
            (!table.is_empty()).then(|| (mode, PhraseSet::whole_words(&table)))
        })
        .collect()
});

fn markers_for(mode: ProjectMode) -> Option<&'static PhraseSet> {
    MARKERS.get(&mode)
}

/// Foreign markers present in `text` for `mode`.
#[must_use]
pub fn foreign_markers(text: &str, mode: ProjectMode) -> Vec<&'static str> {
    markers_for(mode)
        .map(|set| set.matches(&text.to_lowercase()).collect())
        .unwrap_or_default()
}

#[must_use]
pub fn is_drifted(task: &AtomicTask, mode: ProjectMode) -> bool {
    !foreign_markers(&task.search_text(), mode).is_empty()
}

/// Drop drifted tasks. Returns how many were rejected.
pub fn filter_drifted(tasks: &mut Vec<AtomicTask>, mode: ProjectMode) -> usize {
    let before = tasks.len();
    tasks.retain(|task| {
        let markers = foreign_markers(&task.search_text(), mode);
        if markers.is_empty() {
            return true;
        }
        info!(
            task_id = %task.id,
            mode = %mode,
            markers = ?markers,
            "Rejected sub-task drifting out of project mode"
        );
        false
    });
    before - tasks.len()
}
