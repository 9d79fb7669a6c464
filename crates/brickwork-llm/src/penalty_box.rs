//! Time-boxed circuit breaker shared by concurrent dispatches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone)]
struct PenaltyEntry {
    penalized_at: Instant,
    expires_at: Instant,
    reason: Option<String>,
}

/// Records endpoints to skip until their cool-down expires.
///
/// Cloning yields another handle to the same state, so one box can be injected
/// into every dispatcher that should observe the others' penalizations. Expired
/// entries are removed lazily on read; there is no eviction task.
#[derive(Debug, Clone, Default)]
pub struct PenaltyBox {
    entries: Arc<Mutex<HashMap<String, PenaltyEntry>>>,
}

impl PenaltyBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PenaltyEntry>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or refresh an entry expiring `cooldown` from now.
    pub fn penalize(&self, endpoint_id: &str, cooldown: Duration) {
        self.penalize_with_reason(endpoint_id, cooldown, None);
    }

    /// Like [`PenaltyBox::penalize`], remembering why the endpoint was boxed.
    pub fn penalize_with_reason(
        &self,
        endpoint_id: &str,
        cooldown: Duration,
        reason: Option<String>,
    ) {
        let now = Instant::now();
        debug!(
            endpoint = endpoint_id,
            cooldown_secs = cooldown.as_secs(),
            "Penalizing endpoint"
        );
        self.lock().insert(
            endpoint_id.to_string(),
            PenaltyEntry {
                penalized_at: now,
                expires_at: now + cooldown,
                reason,
            },
        );
    }

    /// True if an unexpired entry exists. Expired entries are dropped.
    #[must_use]
    pub fn is_penalized(&self, endpoint_id: &str) -> bool {
        self.remaining(endpoint_id).is_some()
    }

    /// Time left in the box, or `None` if the endpoint is usable.
    #[must_use]
    pub fn remaining(&self, endpoint_id: &str) -> Option<Duration> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get(endpoint_id) {
            Some(entry) if now < entry.expires_at => Some(entry.expires_at - now),
            Some(_) => {
                entries.remove(endpoint_id);
                debug!(endpoint = endpoint_id, "Penalty expired");
                None
            }
            None => None,
        }
    }

    /// Most recent recorded reason among the given endpoints' live entries.
    #[must_use]
    pub fn last_reason<'a, I>(&self, endpoint_ids: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let entries = self.lock();
        let now = Instant::now();
        endpoint_ids
            .into_iter()
            .filter_map(|id| entries.get(id))
            .filter(|entry| now < entry.expires_at)
            .max_by_key(|entry| entry.penalized_at)
            .and_then(|entry| entry.reason.clone())
    }

    /// Lift the penalty for one endpoint.
    pub fn release(&self, endpoint_id: &str) {
        self.lock().remove(endpoint_id);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
