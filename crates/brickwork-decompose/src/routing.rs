//! Adaptive routing: tag each task with the lane an executor should use.
//!
//! Pure classification. Scheduling belongs to whoever executes the plan.

use crate::types::{AtomicTask, RoutingPath};

/// Highest complexity that still routes to the fast lane.
pub const FAST_LANE_MAX_COMPLEXITY: u8 = 6;

#[must_use]
pub fn route(complexity: u8) -> RoutingPath {
    if complexity <= FAST_LANE_MAX_COMPLEXITY {
        RoutingPath::Fast
    } else {
        RoutingPath::Slow
    }
}

/// Re-derive routing and token estimates after complexity changes.
pub fn apply_routing(tasks: &mut [AtomicTask]) {
    for task in tasks {
        task.complexity = task.complexity.clamp(1, 10);
        task.routing_path = route(task.complexity);
        task.estimated_tokens = crate::types::estimate_tokens(task.complexity);
    }
}
