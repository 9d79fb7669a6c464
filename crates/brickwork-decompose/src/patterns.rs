//! Pattern tables driving the heuristics.
//!
//! Data only. The atomicity validator, ordering bias, drift filter and
//! fallback generator read these tables; extending a mode means editing a
//! table, not the traversal code.

use brickwork_utils::types::ProjectMode;

/// Action verbs; three or more distinct ones in an instruction is non-atomic.
pub const ACTION_VERBS: &[&str] = &[
    "add", "analyze", "audit", "build", "collect", "compare", "compile", "configure", "create",
    "define", "deploy", "design", "develop", "document", "draft", "edit", "evaluate", "fix",
    "implement", "install", "integrate", "interview", "migrate", "optimize", "outline", "publish",
    "refactor", "remove", "research", "review", "revise", "survey", "summarize", "test", "update",
    "validate", "write",
];

/// Conjunctions that chain two steps into one instruction.
pub const COMPOUND_PATTERNS: &[&str] = &[
    "and then",
    "followed by",
    "after that",
    "afterwards",
    "as well as",
    "in addition to",
    "along with",
    "and also",
];

/// Scope markers too open-ended to produce one deliverable.
pub const VAGUE_MARKERS: &[&str] = &[
    "everything",
    "etc",
    "and so on",
    "all aspects",
    "whatever",
    "anything else",
    "as needed",
    "and more",
    "various",
];

/// Instructions longer than this are too large to be atomic.
pub const MAX_INSTRUCTION_CHARS: usize = 500;

/// Tasks mentioning these sort earlier among equally-ready tasks.
pub const FOUNDATIONAL_KEYWORDS: &[&str] = &[
    "requirement",
    "requirements",
    "scope",
    "methodology",
    "research question",
    "architecture",
    "foundation",
    "outline",
    "specification",
    "define",
    "plan",
    "jurisdiction",
    "premise",
];

/// Software-implementation vocabulary, foreign to every non-software mode.
pub const SOFTWARE_MARKERS: &[&str] = &[
    "source code",
    "codebase",
    "api endpoint",
    "rest api",
    "database schema",
    "sql",
    "deploy",
    "deployment pipeline",
    "unit test",
    "frontend",
    "backend",
    "microservice",
    "npm",
    "docker",
    "kubernetes",
    "git",
    "pull request",
    "refactor",
    "compile the code",
    "compiler",
];

/// Fiction-craft vocabulary that has no place in a research plan.
pub const RESEARCH_MARKERS: &[&str] = &["plot twist", "character arc", "cliffhanger"];

/// Fiction-craft vocabulary that has no place in a legal plan.
pub const LEGAL_MARKERS: &[&str] = &["plot twist", "character arc", "cliffhanger", "rhyme scheme"];

/// Quantitative-study vocabulary that has no place in a creative plan.
pub const CREATIVE_MARKERS: &[&str] = &[
    "statistical significance",
    "regression analysis",
    "sample size",
    "p-value",
];

/// Vocabulary that is foreign to `mode` and marks a sub-task as drifted.
#[must_use]
pub fn drift_markers(mode: ProjectMode) -> Vec<&'static str> {
    let own: &[&str] = match mode {
        ProjectMode::Research => RESEARCH_MARKERS,
        ProjectMode::Legal => LEGAL_MARKERS,
        ProjectMode::Creative => CREATIVE_MARKERS,
        ProjectMode::Software | ProjectMode::General => return Vec::new(),
    };
    SOFTWARE_MARKERS.iter().chain(own).copied().collect()
}

/// One deterministic fallback task: (title, instruction, complexity).
pub type TaskTemplate = (&'static str, &'static str, u8);

/// Goal keywords and the fallback tasks they trigger (software and general modes).
pub const KEYWORD_TEMPLATES: &[(&[&str], &[TaskTemplate])] = &[
    (
        &["login", "auth", "sign in", "signin", "sign-in", "password", "account"],
        &[
            (
                "Define authentication requirements",
                "Specify the supported login methods, password policy, account lockout rules and session lifetime for user authentication.",
                3,
            ),
            (
                "Design credential storage",
                "Design the user credential store with salted password hashing and document the chosen hashing algorithm.",
                6,
            ),
            (
                "Implement login flow",
                "Implement the login handler that validates submitted credentials and issues an authenticated session token.",
                7,
            ),
            (
                "Implement session management",
                "Implement session token expiry, refresh and logout so authenticated sessions end cleanly.",
                6,
            ),
            (
                "Test authentication flows",
                "Write tests covering successful login, wrong password, locked account and expired session cases.",
                5,
            ),
        ],
    ),
    (
        &["api", "endpoint", "service", "backend"],
        &[
            (
                "Define API contract",
                "Document each endpoint with its request and response shape and error codes.",
                4,
            ),
            (
                "Implement API handlers",
                "Implement the handlers for the agreed endpoints with input validation.",
                7,
            ),
            (
                "Test API error handling",
                "Write tests for malformed input and error responses of every endpoint.",
                5,
            ),
        ],
    ),
    (
        &["database", "data model", "schema", "storage", "persist"],
        &[
            (
                "Design data model",
                "Design the entities, fields and relationships the feature needs to persist.",
                5,
            ),
            (
                "Implement data migrations",
                "Write the migration for the new tables and indexes of the data model.",
                5,
            ),
        ],
    ),
];

/// Mode-level fallback tasks used when no keyword template matches.
#[must_use]
pub fn mode_templates(mode: ProjectMode) -> &'static [TaskTemplate] {
    match mode {
        ProjectMode::Software => &[
            (
                "Define requirements and scope",
                "List the functional requirements, constraints and explicit out-of-scope items for the goal.",
                3,
            ),
            (
                "Design the solution architecture",
                "Describe the components, their responsibilities and the interfaces between them.",
                6,
            ),
            (
                "Implement the core functionality",
                "Implement the smallest working version of the core feature described in the requirements.",
                7,
            ),
            (
                "Add error handling",
                "Handle invalid input and failure paths in the core functionality with clear error messages.",
                5,
            ),
            (
                "Write tests",
                "Write automated tests that cover the requirements and the error paths.",
                5,
            ),
        ],
        ProjectMode::Research => &[
            (
                "Define research questions and scope",
                "State the research questions, hypotheses and the boundaries of the study.",
                3,
            ),
            (
                "Conduct literature review",
                "Survey prior work on the topic and record each source with a full citation.",
                6,
            ),
            (
                "Design the methodology",
                "Choose the study design, data sources and analysis method and justify each choice.",
                6,
            ),
            (
                "Analyze the collected data",
                "Apply the chosen analysis method to the collected data and record the results.",
                7,
            ),
            (
                "Write up findings with citations",
                "Summarize the findings, their limitations and cite every supporting source.",
                5,
            ),
        ],
        ProjectMode::Legal => &[
            (
                "Identify jurisdiction and governing law",
                "Determine the jurisdiction and the statutes that govern the matter.",
                4,
            ),
            (
                "Review statutes and precedent",
                "Summarize the relevant statutes and precedent cases with citations.",
                6,
            ),
            (
                "Draft the document",
                "Draft the document text following the applicable legal requirements.",
                7,
            ),
            (
                "Review compliance and risk",
                "Check the draft against compliance obligations and list the residual risks.",
                6,
            ),
        ],
        ProjectMode::Creative => &[
            (
                "Define premise and audience",
                "State the premise, target audience and intended tone of the work.",
                3,
            ),
            (
                "Outline the structure",
                "Outline the sections or scenes in order with one line on the purpose of each.",
                4,
            ),
            (
                "Draft the content",
                "Write the first full version of the work, section by section.",
                7,
            ),
            (
                "Revise and polish",
                "Revise the draft for pacing, consistency of voice and language.",
                5,
            ),
        ],
        ProjectMode::General => &[
            (
                "Define requirements and scope",
                "List what must be delivered, the constraints and what is explicitly out of scope.",
                3,
            ),
            (
                "Plan the approach",
                "Break the goal into stages and pick the method for each stage.",
                4,
            ),
            (
                "Produce the main deliverable",
                "Produce the main deliverable following the plan.",
                6,
            ),
            (
                "Review the result",
                "Review the deliverable against the requirements and list any gaps.",
                4,
            ),
        ],
    }
}

/// Default specialist roster per mode: (id, role, capabilities).
#[must_use]
pub fn default_council(mode: ProjectMode) -> &'static [(&'static str, &'static str, &'static [&'static str])] {
    match mode {
        ProjectMode::Software => &[
            ("architect", "Software Architect", &["architecture", "design", "requirements", "scope", "data model"]),
            ("backend", "Backend Engineer", &["implement", "api", "database", "authentication", "session", "login"]),
            ("qa", "QA Engineer", &["test", "validation", "error handling", "edge case"]),
        ],
        ProjectMode::Research => &[
            ("methodologist", "Research Methodologist", &["methodology", "research question", "scope", "design"]),
            ("analyst", "Data Analyst", &["data", "analysis", "statistics", "collect"]),
            ("writer", "Academic Writer", &["literature", "citation", "write", "findings"]),
        ],
        ProjectMode::Legal => &[
            ("counsel", "Legal Counsel", &["jurisdiction", "statute", "precedent", "law"]),
            ("drafter", "Legal Drafter", &["draft", "clause", "document"]),
            ("compliance", "Compliance Reviewer", &["compliance", "risk", "review"]),
        ],
        ProjectMode::Creative => &[
            ("storyteller", "Story Architect", &["premise", "outline", "structure", "audience"]),
            ("writer", "Writer", &["draft", "write", "scene", "content"]),
            ("editor", "Editor", &["revise", "polish", "voice", "tone"]),
        ],
        ProjectMode::General => &[
            ("planner", "Planner", &["requirements", "scope", "plan", "approach"]),
            ("executor", "Executor", &["produce", "deliverable", "build", "implement"]),
            ("reviewer", "Reviewer", &["review", "verify", "gaps", "quality"]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_tables_are_lowercase() {
        for table in [
            ACTION_VERBS,
            COMPOUND_PATTERNS,
            VAGUE_MARKERS,
            FOUNDATIONAL_KEYWORDS,
            SOFTWARE_MARKERS,
            RESEARCH_MARKERS,
            LEGAL_MARKERS,
            CREATIVE_MARKERS,
        ] {
            for entry in table {
                assert_eq!(*entry, entry.to_lowercase(), "{entry} must be lowercase");
            }
        }
    }

    #[test]
    fn test_every_mode_has_fallbacks_and_council() {
        for mode in ProjectMode::iter() {
            assert!(mode_templates(mode).len() >= 2, "{mode} needs fallback tasks");
            assert!(!default_council(mode).is_empty(), "{mode} needs a council");
        }
    }

    #[test]
    fn test_drift_markers_only_for_non_software_modes() {
        assert!(drift_markers(ProjectMode::Software).is_empty());
        assert!(drift_markers(ProjectMode::General).is_empty());
        assert!(!drift_markers(ProjectMode::Research).is_empty());
    }

    #[test]
    fn test_drift_markers_differ_per_mode() {
        assert!(drift_markers(ProjectMode::Creative).contains(&"sample size"));
        assert!(!drift_markers(ProjectMode::Research).contains(&"sample size"));
        assert!(drift_markers(ProjectMode::Legal).contains(&"rhyme scheme"));
    }

    #[test]
    fn test_cross_domain_verbs_are_not_drift_markers() {
        for mode in ProjectMode::iter() {
            let markers = drift_markers(mode);
            for verb in ["compile", "draft", "review", "build", "test"] {
                assert!(!markers.contains(&verb), "{verb} is an ordinary verb in {mode}");
            }
        }
    }

    #[test]
    fn test_fallback_instructions_stay_atomic_sized() {
        let all = KEYWORD_TEMPLATES
            .iter()
            .flat_map(|(_, t)| t.iter())
            .chain(ProjectMode::iter().flat_map(|m| mode_templates(m).iter()));
        for (_, instruction, complexity) in all {
            assert!(instruction.len() <= MAX_INSTRUCTION_CHARS);
            assert!((1..=10).contains(complexity));
        }
    }
}
