use serde::{Deserialize, Serialize};

/// Project modes that shape prompts, checklists and drift filtering.
///
/// Every stage that talks to a model or judges a plan consults the mode:
/// decomposition rejects sub-tasks carrying mode-foreign vocabulary, the
/// saboteur picks its checklist from it, and the auditor picks its automatic
/// failure criteria from it.
///
/// # Example
///
/// ```rust
/// use brickwork_utils::types::ProjectMode;
///
/// let mode: ProjectMode = "research".parse().unwrap();
/// assert_eq!(mode, ProjectMode::Research);
/// assert_eq!(mode.as_str(), "research");
/// assert!(!mode.is_software());
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProjectMode {
    Software,
    Research,
    Legal,
    Creative,
    #[default]
    General,
}

impl ProjectMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Research => "research",
            Self::Legal => "legal",
            Self::Creative => "creative",
            Self::General => "general",
        }
    }

    #[must_use]
    pub const fn is_software(&self) -> bool {
        matches!(self, Self::Software)
    }
}

/// Read-only project constraints produced by the Genesis stage.
///
/// Consumed by decomposition and verification, never mutated by them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constitution {
    pub domain: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub mode: ProjectMode,
}

impl Constitution {
    pub fn new(domain: impl Into<String>, mode: ProjectMode) -> Self {
        Self {
            domain: domain.into(),
            tech_stack: Vec::new(),
            constraints: Vec::new(),
            mode,
        }
    }

    #[must_use]
    pub fn with_tech_stack<I, S>(mut self, stack: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tech_stack = stack.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints = constraints.into_iter().map(Into::into).collect();
        self
    }

    /// Render the constitution as a prompt context block.
    #[must_use]
    pub fn context_block(&self) -> String {
        let mut block = format!("PROJECT MODE: {}\nDOMAIN: {}\n", self.mode, self.domain);
        if !self.tech_stack.is_empty() {
            block.push_str(&format!("TECH STACK: {}\n", self.tech_stack.join(", ")));
        }
        if !self.constraints.is_empty() {
            block.push_str("CONSTRAINTS:\n");
            for constraint in &self.constraints {
                block.push_str(&format!("- {constraint}\n"));
            }
        }
        block
    }
}

/// Token counts reported by a provider for one successful call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Build usage from optional provider counts; `None` when neither is known.
    #[must_use]
    pub fn from_counts(input: Option<u64>, output: Option<u64>) -> Option<Self> {
        if input.is_none() && output.is_none() {
            return None;
        }
        Some(Self {
            input_tokens: input.unwrap_or(0),
            output_tokens: output.unwrap_or(0),
        })
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
