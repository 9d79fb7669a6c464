//! Logging and observability infrastructure for brickwork
//!
//! Structured logging is built on `tracing`. Library code only emits events;
//! installing a subscriber is left to the embedding application, which can use
//! [`init_tracing`] or [`init_tracing_json`] for a sensible default.

use serde::{Deserialize, Serialize};
use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("brickwork=debug,info")
            } else {
                EnvFilter::try_new("brickwork=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize a human-readable tracing subscriber.
///
/// `RUST_LOG` takes precedence. Without it, `verbose` selects between
/// `brickwork=debug,info` and `brickwork=info,warn`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if verbose {
        tracing_subscriber::registry()
            .with(env_filter(true))
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter(false))
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Initialize a JSON tracing subscriber for log shipping.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing_json(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(fmt::layer().json().with_current_span(true))
        .try_init()?;
    Ok(())
}

/// Span wrapping one multi-endpoint dispatch.
pub fn dispatch_span(label: &str, endpoints: usize) -> tracing::Span {
    span!(
        Level::INFO,
        "dispatch",
        label = %label,
        endpoints = endpoints,
    )
}

/// Span wrapping one session phase.
pub fn phase_span(session_id: &str, phase: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "session_phase",
        session_id = %session_id,
        phase = %phase,
    )
}

/// Counters collected during one decomposition run.
///
/// Emitted as a single structured `info!` event when the run finishes and
/// returned on the plan so callers can surface them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompositionStats {
    pub iterations: usize,
    pub splits: usize,
    pub drift_rejections: usize,
    pub stall_events: usize,
    pub merged_duplicates: usize,
}

impl DecompositionStats {
    /// Emit the counters as one structured event.
    pub fn log_summary(&self, goal_chars: usize, task_count: usize) {
        tracing::info!(
            goal_chars,
            task_count,
            iterations = self.iterations,
            splits = self.splits,
            drift_rejections = self.drift_rejections,
            stall_events = self.stall_events,
            merged_duplicates = self.merged_duplicates,
            "Decomposition finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_are_constructible_without_subscriber() {
        let span = dispatch_span("classify", 3);
        let _guard = span.enter();
        let phase = phase_span("s-1", "genesis");
        let _phase_guard = phase.enter();
    }

    #[test]
    fn test_stats_default_is_zeroed() {
        let stats = DecompositionStats::default();
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.drift_rejections, 0);
        let json = serde_json::to_value(stats).unwrap();
        assert!(json.get("driftRejections").is_some());
    }
}
