//! Session persistence seam.
//!
//! The state machine only needs two capabilities from its backing store:
//! read a session record and shallow-merge a partial update into it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use brickwork_utils::SessionError;
use serde_json::Value;

/// Persisted session payload: a flat JSON object keyed by stage name.
pub type SessionRecord = serde_json::Map<String, Value>;

/// Backing store for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the full record for `session_id`, or `None` if it was never written.
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Shallow-merge `partial` into the record, creating it if absent.
    ///
    /// A `null` value removes the key.
    async fn update(&self, session_id: &str, partial: SessionRecord) -> Result<(), SessionError>;
}

/// Apply `partial` to `record` with the store's merge rules.
pub fn merge_record(record: &mut SessionRecord, partial: SessionRecord) {
    for (key, value) in partial {
        if value.is_null() {
            record.remove(&key);
        } else {
            record.insert(key, value);
        }
    }
}

/// In-memory store backed by a `HashMap<session_id, record>`.
///
/// Cloning yields another handle onto the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    records: Arc<Mutex<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions held.
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> SessionError {
    SessionError::Store("in-memory session store lock poisoned".to_string())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records.get(session_id).cloned())
    }

    async fn update(&self, session_id: &str, partial: SessionRecord) -> Result<(), SessionError> {
        let mut records = self.records.lock().map_err(poisoned)?;
        let record = records.entry(session_id.to_string()).or_default();
        merge_record(record, partial);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SessionRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_update_is_shallow_merge() {
        let store = InMemorySessionStore::new();
        assert!(store.get("s").await.unwrap().is_none());

        store
            .update("s", record(json!({"goal": "g", "nested": {"a": 1, "b": 2}})))
            .await
            .unwrap();
        store
            .update("s", record(json!({"nested": {"c": 3}, "extra": true})))
            .await
            .unwrap();

        let stored = store.get("s").await.unwrap().unwrap();
        assert_eq!(stored["goal"], "g");
        assert_eq!(stored["nested"], json!({"c": 3}));
        assert_eq!(stored["extra"], true);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_null_removes_key() {
        let store = InMemorySessionStore::new();
        store
            .update("s", record(json!({"checkpoint": {"phase": "genesis"}, "goal": "g"})))
            .await
            .unwrap();
        store
            .update("s", record(json!({"checkpoint": null})))
            .await
            .unwrap();

        let stored = store.get("s").await.unwrap().unwrap();
        assert!(!stored.contains_key("checkpoint"));
        assert_eq!(stored["goal"], "g");
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = InMemorySessionStore::new();
        let handle = store.clone();
        handle
            .update("s", record(json!({"goal": "g"})))
            .await
            .unwrap();
        assert!(store.get("s").await.unwrap().is_some());
        assert!(store.get("other").await.unwrap().is_none());
    }
}
