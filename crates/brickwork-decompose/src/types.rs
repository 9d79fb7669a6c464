use serde::{Deserialize, Serialize};

use brickwork_config::DecompositionConfig;
use brickwork_utils::logging::DecompositionStats;

use crate::routing::route;

/// Execution lane for a task, chosen from its complexity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoutingPath {
    /// Higher-throughput, cheaper models (complexity 1-6)
    #[default]
    Fast,
    /// Higher-reasoning models (complexity 7-10)
    Slow,
}

/// A task validated to have one action and one deliverable.
///
/// `dependencies` reference ids in the same plan; merge and ordering passes
/// prune anything dangling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicTask {
    pub id: String,
    pub title: String,
    pub instruction: String,
    pub domain: String,
    /// 1-10
    pub complexity: u8,
    pub routing_path: RoutingPath,
    pub estimated_tokens: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_specialist: Option<String>,
    pub is_atomic: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub atomicity_issues: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AtomicTask {
    /// New enabled task with routing and token estimate derived from complexity.
    ///
    /// Atomicity is unknown until [`crate::atomicity::validate`] runs.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        instruction: impl Into<String>,
        domain: impl Into<String>,
        complexity: u8,
    ) -> Self {
        let complexity = complexity.clamp(1, 10);
        Self {
            id: id.into(),
            title: title.into(),
            instruction: instruction.into(),
            domain: domain.into(),
            complexity,
            routing_path: route(complexity),
            estimated_tokens: estimate_tokens(complexity),
            dependencies: Vec::new(),
            assigned_specialist: None,
            is_atomic: true,
            atomicity_issues: Vec::new(),
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Title and instruction, lowercased, for keyword matching.
    #[must_use]
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.instruction).to_lowercase()
    }
}

/// Rough output budget for a task of the given complexity.
#[must_use]
pub fn estimate_tokens(complexity: u8) -> u32 {
    500 + u32::from(complexity.clamp(1, 10)) * 300
}

/// A member of the specialist council.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialist {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "default_specialist_temperature")]
    pub temperature: f32,
}

fn default_specialist_temperature() -> f32 {
    0.3
}

/// Specialist roster proposed once per decomposition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilProposal {
    pub domain: String,
    #[serde(default)]
    pub specialists: Vec<Specialist>,
    #[serde(default)]
    pub reasoning: String,
}

impl CouncilProposal {
    #[must_use]
    pub fn specialist(&self, id: &str) -> Option<&Specialist> {
        self.specialists.iter().find(|s| s.id == id)
    }
}

/// Output of domain classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainClassification {
    pub domain: String,
    #[serde(default, alias = "sub_domain")]
    pub sub_domain: Option<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

impl DomainClassification {
    /// Used whenever classification fails; never fatal.
    #[must_use]
    pub fn general() -> Self {
        Self {
            domain: "General".to_string(),
            sub_domain: None,
            expertise: Vec::new(),
            confidence: 0.5,
        }
    }
}

/// Why the refinement queue stopped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// Queue drained with every branch resolved
    Completed,
    MaxIterations,
    /// Queue drained but at least one branch was frozen by the stall counter
    StallLimit,
    MaxTasks,
}

/// Result of a full decomposition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub goal: String,
    pub classification: DomainClassification,
    pub council: CouncilProposal,
    /// Dependency-ordered
    pub tasks: Vec<AtomicTask>,
    pub stop_reason: StopReason,
    pub stats: DecompositionStats,
}

/// Bounds that guarantee the refinement queue terminates.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionLimits {
    pub max_depth: usize,
    pub max_tasks: usize,
    pub max_iterations: usize,
    pub stall_limit: usize,
    pub stall_epsilon: f64,
    pub duplicate_threshold: f64,
    pub base_temperature: f32,
    pub retry_temperature: f32,
}

impl Default for DecompositionLimits {
    fn default() -> Self {
        Self::from(&DecompositionConfig::default())
    }
}

impl From<&DecompositionConfig> for DecompositionLimits {
    fn from(config: &DecompositionConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_tasks: config.max_tasks,
            max_iterations: config.max_iterations,
            stall_limit: config.stall_limit,
            stall_epsilon: config.stall_epsilon,
            duplicate_threshold: config.duplicate_threshold,
            base_temperature: config.base_temperature,
            retry_temperature: config.retry_temperature,
        }
    }
}
