//! Working tier — per-session scratch values.
//!
//! Each session holds at most `max_size` keys. When a new key would exceed
//! that, the key inserted first is evicted. Overwriting an existing key keeps
//! its original position.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkingEntry {
    pub value: serde_json::Value,
    pub written_at: DateTime<Utc>,
}

#[derive(Default)]
struct WorkingSet {
    values: HashMap<String, WorkingEntry>,
    order: VecDeque<String>,
}

pub struct WorkingStore {
    max_size: usize,
    sessions: RwLock<HashMap<String, WorkingSet>>,
}

impl WorkingStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Set a value. Returns the keys evicted to make room.
    pub async fn set(
        &self,
        session_id: &str,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Vec<String> {
        let key = key.into();
        let mut sessions = self.sessions.write().await;
        let set = sessions.entry(session_id.to_string()).or_default();

        let entry = WorkingEntry {
            value,
            written_at: Utc::now(),
        };
        if set.values.insert(key.clone(), entry).is_none() {
            set.order.push_back(key);
        }

        let mut evicted = Vec::new();
        while set.values.len() > self.max_size {
            let Some(oldest) = set.order.pop_front() else {
                break;
            };
            set.values.remove(&oldest);
            evicted.push(oldest);
        }
        if !evicted.is_empty() {
            debug!(session_id, evicted = ?evicted, "Evicted working memory keys");
        }
        evicted
    }

    pub async fn get(&self, session_id: &str, key: &str) -> Option<serde_json::Value> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .and_then(|set| set.values.get(key))
            .map(|e| e.value.clone())
    }

    /// Snapshot of a session's working set, in insertion order.
    pub async fn get_all(&self, session_id: &str) -> Vec<(String, WorkingEntry)> {
        let sessions = self.sessions.read().await;
        let Some(set) = sessions.get(session_id) else {
            return Vec::new();
        };
        set.order
            .iter()
            .filter_map(|k| set.values.get(k).map(|e| (k.clone(), e.clone())))
            .collect()
    }

    pub async fn remove(&self, session_id: &str, key: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(set) = sessions.get_mut(session_id) else {
            return false;
        };
        if set.values.remove(key).is_none() {
            return false;
        }
        set.order.retain(|k| k != key);
        true
    }

    pub async fn clear(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn evicts_first_inserted_key() {
        let store = WorkingStore::new(2);
        store.set("s", "a", json!(1)).await;
        store.set("s", "b", json!(2)).await;
        let evicted = store.set("s", "c", json!(3)).await;

        assert_eq!(evicted, vec!["a"]);
        let keys: Vec<String> = store.get_all("s").await.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert!(store.get("s", "a").await.is_none());
    }

    #[tokio::test]
    async fn overwrite_keeps_position() {
        let store = WorkingStore::new(2);
        store.set("s", "a", json!("old")).await;
        store.set("s", "b", json!(2)).await;
        store.set("s", "a", json!("new")).await;
        store.set("s", "c", json!(3)).await;

        // "a" was first in, so it goes even though it was just rewritten
        assert!(store.get("s", "a").await.is_none());
        assert_eq!(store.get("s", "b").await, Some(json!(2)));
        assert_eq!(store.get("s", "c").await, Some(json!(3)));
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let store = WorkingStore::new(4);
        store.set("s", "a", json!(1)).await;
        store.set("s", "b", json!(2)).await;
        store.set("other", "a", json!(9)).await;

        assert!(store.remove("s", "a").await);
        assert!(!store.remove("s", "a").await);
        assert_eq!(store.get_all("s").await.len(), 1);

        store.clear("s").await;
        assert!(store.get_all("s").await.is_empty());
        assert_eq!(store.get("other", "a").await, Some(json!(9)));
    }
}
