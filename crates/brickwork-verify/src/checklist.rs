//! Deterministic domain checklist.
//!
//! Each project mode names the aspects a complete plan must touch. An aspect
//! counts as covered when any task's title or instruction starts a word with
//! one of its keywords. Missing core aspects are major gaps, the rest minor.

use brickwork_decompose::AtomicTask;
use brickwork_decompose::text::PhraseSet;
use brickwork_utils::types::ProjectMode;
use tracing::debug;

use crate::types::{GapCategory, GapSeverity, IdentifiedGap};

/// One required aspect of a plan.
#[derive(Debug, Clone, Copy)]
pub struct Aspect {
    pub name: &'static str,
    /// Word-start keywords, lowercase
    pub keywords: &'static [&'static str],
    pub core: bool,
    pub category: GapCategory,
}

const fn aspect(
    name: &'static str,
    keywords: &'static [&'static str],
    core: bool,
    category: GapCategory,
) -> Aspect {
    Aspect {
        name,
        keywords,
        core,
        category,
    }
}

const SOFTWARE: &[Aspect] = &[
    aspect("requirements", &["requirement", "scope", "specification", "user stor"], true, GapCategory::Coverage),
    aspect("testing", &["test", "qa", "verif", "validat"], true, GapCategory::Testing),
    aspect("error handling", &["error", "failure", "exception", "fallback", "invalid"], true, GapCategory::ErrorHandling),
    aspect(
        "authentication",
        &["auth", "login", "log in", "password", "credential", "session", "sign in", "oauth", "token"],
        false,
        GapCategory::Security,
    ),
    aspect("documentation", &["document", "readme", "guide"], false, GapCategory::Coverage),
];

const RESEARCH: &[Aspect] = &[
    aspect("methodology", &["methodolog", "method", "study design", "protocol"], true, GapCategory::Coverage),
    aspect("citations", &["citation", "cite", "source", "reference", "bibliograph"], true, GapCategory::Coverage),
    aspect("literature review", &["literature", "prior work", "related work"], true, GapCategory::Coverage),
    aspect("data analysis", &["analy", "statistic", "data"], false, GapCategory::Coverage),
    aspect("ethics", &["ethic", "consent", "irb"], false, GapCategory::Coverage),
];

const LEGAL: &[Aspect] = &[
    aspect("jurisdiction", &["jurisdiction", "governing law", "statute"], true, GapCategory::Coverage),
    aspect("compliance", &["complian", "regulat"], true, GapCategory::Coverage),
    aspect("precedent", &["precedent", "case law"], true, GapCategory::Coverage),
    aspect("risk", &["risk", "liabilit"], false, GapCategory::Coverage),
];

const CREATIVE: &[Aspect] = &[
    aspect("audience", &["audience", "reader", "viewer"], true, GapCategory::Coverage),
    aspect("structure", &["structure", "outline", "chapter", "scene", "section"], true, GapCategory::Coverage),
    aspect("revision", &["revis", "edit", "polish", "feedback"], false, GapCategory::Coverage),
];

const GENERAL: &[Aspect] = &[
    aspect("requirements and scope", &["requirement", "scope", "objective"], true, GapCategory::Coverage),
    aspect("verification", &["review", "verif", "test", "check", "validat"], true, GapCategory::Testing),
    aspect("timeline", &["timeline", "schedule", "milestone", "deadline"], false, GapCategory::Coverage),
];

/// Aspect table for a mode.
#[must_use]
pub fn aspects(mode: ProjectMode) -> &'static [Aspect] {
    match mode {
        ProjectMode::Software => SOFTWARE,
        ProjectMode::Research => RESEARCH,
        ProjectMode::Legal => LEGAL,
        ProjectMode::Creative => CREATIVE,
        ProjectMode::General => GENERAL,
    }
}

/// Whether any enabled task touches `aspect`.
#[must_use]
pub fn is_covered(aspect: &Aspect, tasks: &[AtomicTask]) -> bool {
    let keywords = PhraseSet::prefixes(aspect.keywords);
    tasks
        .iter()
        .filter(|t| t.enabled)
        .any(|t| keywords.is_match(&t.search_text()))
}

/// Gaps for every aspect of `mode` no task covers.
#[must_use]
pub fn scan(tasks: &[AtomicTask], mode: ProjectMode) -> Vec<IdentifiedGap> {
    aspects(mode)
        .iter()
        .filter(|aspect| !is_covered(aspect, tasks))
        .map(|aspect| {
            debug!(aspect = aspect.name, mode = %mode, core = aspect.core, "Checklist aspect uncovered");
            let title = format!("Missing {}", aspect.name);
            IdentifiedGap {
                id: IdentifiedGap::derive_id(aspect.category, &title),
                severity: if aspect.core {
                    GapSeverity::Major
                } else {
                    GapSeverity::Minor
                },
                category: aspect.category,
                description: format!("No task in this {mode} plan addresses {}.", aspect.name),
                suggested_fix: format!("Add a task dedicated to {}.", aspect.name),
                title,
                affected_tasks: Vec::new(),
            }
        })
        .collect()
}
