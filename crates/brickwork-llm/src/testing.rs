//! Scripted transport for tests.
//!
//! [`ScriptedBackend`] replays queued responses and errors instead of calling a
//! vendor. Responses can be routed by request label so multi-stage pipelines
//! (classification, council, tasks, audits) get the right answer for each call
//! regardless of ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use brickwork_utils::error::LlmError;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

type Scripted = Result<String, LlmError>;

#[derive(Default)]
struct Script {
    queue: VecDeque<Scripted>,
    routes: HashMap<String, VecDeque<Scripted>>,
    sticky_routes: HashMap<String, Scripted>,
    fallback: Option<Scripted>,
}

/// Transport that answers from a script and records every invocation.
///
/// Resolution order for each call: the label's route queue, the label's sticky
/// response, the shared queue, the fallback. With nothing left the call fails
/// with `LlmError::Transport("script exhausted")`.
pub struct ScriptedBackend {
    name: String,
    script: Mutex<Script>,
    invocations: Mutex<Vec<LlmInvocation>>,
    usage: Option<(u64, u64)>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(Script::default()),
            invocations: Mutex::new(Vec::new()),
            usage: None,
            delay: None,
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue a successful response.
    #[must_use]
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.script().queue.push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_error(self, error: LlmError) -> Self {
        self.script().queue.push_back(Err(error));
        self
    }

    /// Queue a response for calls whose request label equals `label`.
    #[must_use]
    pub fn with_route(self, label: impl Into<String>, text: impl Into<String>) -> Self {
        self.script()
            .routes
            .entry(label.into())
            .or_default()
            .push_back(Ok(text.into()));
        self
    }

    /// Queue a failure for calls whose request label equals `label`.
    #[must_use]
    pub fn with_route_error(self, label: impl Into<String>, error: LlmError) -> Self {
        self.script()
            .routes
            .entry(label.into())
            .or_default()
            .push_back(Err(error));
        self
    }

    /// Answer every call labelled `label` with `text` once its queue is empty.
    #[must_use]
    pub fn with_sticky_route(self, label: impl Into<String>, text: impl Into<String>) -> Self {
        self.script()
            .sticky_routes
            .insert(label.into(), Ok(text.into()));
        self
    }

    /// Answer every otherwise-unscripted call with `text`.
    #[must_use]
    pub fn with_fallback(self, text: impl Into<String>) -> Self {
        self.script().fallback = Some(Ok(text.into()));
        self
    }

    /// Fail every otherwise-unscripted call with `error`.
    #[must_use]
    pub fn with_fallback_error(self, error: LlmError) -> Self {
        self.script().fallback = Some(Err(error));
        self
    }

    /// Report these token counts on every success.
    #[must_use]
    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.usage = Some((input, output));
        self
    }

    /// Sleep (on the tokio clock) before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.invocations.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Number of invocations with the given label.
    pub fn calls_for(&self, label: &str) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|inv| inv.request_label == label)
            .count()
    }

    /// Snapshot of every recorded invocation.
    pub fn invocations(&self) -> Vec<LlmInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn next_for(&self, label: &str) -> Scripted {
        let mut script = self.script();
        if let Some(next) = script.routes.get_mut(label).and_then(VecDeque::pop_front) {
            return next;
        }
        if let Some(sticky) = script.sticky_routes.get(label) {
            return sticky.clone();
        }
        if let Some(next) = script.queue.pop_front() {
            return next;
        }
        script
            .fallback
            .clone()
            .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let label = inv.request_label.clone();
        let model = inv.model.clone();
        self.invocations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(inv);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text = self.next_for(&label)?;
        let mut result = LlmResult::new(text, self.name.clone(), model);
        if let Some((input, output)) = self.usage {
            result = result.with_tokens(input, output);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(label: &str) -> LlmInvocation {
        LlmInvocation::new(label, "m", Duration::from_secs(1), vec![])
    }

    #[tokio::test]
    async fn test_routes_take_precedence_over_queue() {
        let backend = ScriptedBackend::new("s")
            .with_response("queued")
            .with_route("audit", "routed")
            .with_sticky_route("audit", "sticky");

        assert_eq!(backend.invoke(inv("audit")).await.unwrap().raw_response, "routed");
        assert_eq!(backend.invoke(inv("audit")).await.unwrap().raw_response, "sticky");
        assert_eq!(backend.invoke(inv("other")).await.unwrap().raw_response, "queued");
        assert!(backend.invoke(inv("other")).await.is_err());
        assert_eq!(backend.calls(), 4);
        assert_eq!(backend.calls_for("audit"), 2);
    }

    #[tokio::test]
    async fn test_fallback_repeats() {
        let backend = ScriptedBackend::new("s").with_fallback("again");
        for _ in 0..3 {
            assert_eq!(backend.invoke(inv("x")).await.unwrap().raw_response, "again");
        }
    }
}
