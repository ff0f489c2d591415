//! Short-term tier — recent turns per session, bounded and expiring.
//!
//! Expiry is lazy: `get` drops anything past its TTL and rewrites the
//! session's list under the same write lock.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::trace;
use vireo_core::memory::Memory;

pub struct ShortTermStore {
    max_items: usize,
    ttl: Duration,
    sessions: RwLock<HashMap<String, Vec<Memory>>>,
}

impl ShortTermStore {
    pub fn new(max_items: usize, ttl: Duration) -> Self {
        Self {
            max_items: max_items.max(1),
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Live entries for a session, oldest first.
    pub async fn get(&self, session_id: &str) -> Vec<Memory> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let Some(entries) = sessions.get_mut(session_id) else {
            return Vec::new();
        };

        let before = entries.len();
        entries.retain(|m| self.is_live(m, now));
        if entries.len() != before {
            trace!(session_id, expired = before - entries.len(), "Dropped expired short-term entries");
        }

        if entries.is_empty() {
            sessions.remove(session_id);
            return Vec::new();
        }
        entries.clone()
    }

    /// Append an entry, keeping only the newest `max_items`.
    pub async fn set(&self, memory: Memory) {
        let mut sessions = self.sessions.write().await;
        let entries = sessions.entry(memory.session_id.clone()).or_default();
        entries.push(memory);
        if entries.len() > self.max_items {
            let overflow = entries.len() - self.max_items;
            entries.drain(..overflow);
        }
    }

    pub async fn clear(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// Live entry count for a session.
    pub async fn len(&self, session_id: &str) -> usize {
        self.get(session_id).await.len()
    }

    fn is_live(&self, memory: &Memory, now: DateTime<Utc>) -> bool {
        let ttl = memory.ttl_secs.map(Duration::from_secs).unwrap_or(self.ttl);
        match now.signed_duration_since(memory.created_at).to_std() {
            Ok(age) => age < ttl,
            // Created "in the future" (clock skew): keep it.
            Err(_) => true,
        }
    }
}
