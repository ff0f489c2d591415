//! MemoryManager — one facade over the three tiers.
//!
//! Routing rules:
//! - `working` memories go to the working set only, keyed by id;
//! - everything else goes to short-term;
//! - importance above 0.7 is additionally written to long-term;
//! - every `compression_threshold` short-term writes in a session produce a
//!   digest that is stored to long-term with importance 0.9.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use vireo_core::error::MemoryError;
use vireo_core::memory::{Memory, MemoryKind};
use vireo_core::message::Role;

use crate::compressor::Compressor;
use crate::long_term::LongTermStore;
use crate::short_term::ShortTermStore;
use crate::working::{WorkingEntry, WorkingStore};

/// Importance assigned to compressed digests.
pub const COMPRESSED_IMPORTANCE: f32 = 0.9;

/// Importance given to working values when they are ranked alongside other tiers.
pub const WORKING_IMPORTANCE: f32 = 0.5;

/// Ranked memories from [`MemoryManager::retrieve`].
#[derive(Debug, Default)]
pub struct Recall {
    pub memories: Vec<Memory>,
    /// Set when the long-term tier could not be searched. The other tiers
    /// still contribute.
    pub long_term_error: Option<MemoryError>,
}

pub struct MemoryManager {
    short_term: ShortTermStore,
    working: WorkingStore,
    long_term: Option<LongTermStore>,
    compressor: Compressor,
    compression_threshold: usize,
    /// Short-term writes per session since the last digest.
    pending: Mutex<HashMap<String, usize>>,
}

impl MemoryManager {
    pub fn new(short_term: ShortTermStore, working: WorkingStore) -> Self {
        Self {
            short_term,
            working,
            long_term: None,
            compressor: Compressor::default(),
            compression_threshold: 10,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_long_term(mut self, long_term: LongTermStore) -> Self {
        self.long_term = Some(long_term);
        self
    }

    pub fn with_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold.max(1);
        self
    }

    pub fn short_term(&self) -> &ShortTermStore {
        &self.short_term
    }

    pub fn working(&self) -> &WorkingStore {
        &self.working
    }

    pub fn long_term(&self) -> Option<&LongTermStore> {
        self.long_term.as_ref()
    }

    /// Route a memory to its tiers. Returns the memory's id.
    ///
    /// The short-term write always lands. A failed long-term promotion is
    /// returned as an error after the fact; a failed digest is only logged.
    pub async fn store(&self, mut memory: Memory) -> Result<String, MemoryError> {
        if memory.id.is_empty() {
            memory.id = Uuid::new_v4().to_string();
        }
        let id = memory.id.clone();

        if memory.kind == MemoryKind::Working {
            self.working
                .set(&memory.session_id, id.clone(), serde_json::Value::String(memory.content))
                .await;
            return Ok(id);
        }

        self.short_term.set(memory.clone()).await;

        let promotion = match &self.long_term {
            Some(long_term) if memory.is_important() => long_term.store(memory.clone()).await.map(|_| ()),
            _ => Ok(()),
        };

        if self.bump_pending(&memory.session_id) {
            if let Err(e) = self.compress_recent(&memory.session_id).await {
                warn!(session_id = %memory.session_id, error = %e, "Session compression failed");
            }
        }

        promotion.map(|_| id)
    }

    /// Rank memories from all tiers for `query`.
    ///
    /// Score = relevance × importance, where relevance is 1.0 for an exact
    /// text match and otherwise decays with hours since last access. Entries
    /// present in several tiers are counted once at their best score.
    pub async fn retrieve(&self, query: &str, session_id: &str, top_k: usize) -> Recall {
        let now = Utc::now();
        let mut candidates: Vec<Memory> = Vec::new();
        let mut long_term_error = None;

        for (key, entry) in self.working.get_all(session_id).await {
            candidates.push(working_to_memory(session_id, &key, entry));
        }

        candidates.extend(self.short_term.get(session_id).await);

        if let Some(long_term) = &self.long_term {
            match long_term.search(query, Some(session_id), top_k).await {
                Ok(found) => candidates.extend(found),
                Err(e) => {
                    warn!(session_id, error = %e, "Long-term search skipped");
                    long_term_error = Some(e);
                }
            }
        }

        let mut best: HashMap<String, (f32, Memory)> = HashMap::new();
        for memory in candidates {
            let candidate = score(&memory, query, now);
            match best.get(&memory.id) {
                Some((existing, _)) if *existing >= candidate => {}
                _ => {
                    best.insert(memory.id.clone(), (candidate, memory));
                }
            }
        }

        let mut ranked: Vec<(f32, Memory)> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });
        ranked.truncate(top_k);
        Recall {
            memories: ranked.into_iter().map(|(_, m)| m).collect(),
            long_term_error,
        }
    }

    /// Digest the whole short-term tier of a session into long-term.
    ///
    /// Does nothing below the compression threshold or without a long-term
    /// tier. Returns the digest's id when one was stored.
    pub async fn compress_session(&self, session_id: &str) -> Result<Option<String>, MemoryError> {
        let entries = self.short_term.get(session_id).await;
        if entries.len() < self.compression_threshold {
            return Ok(None);
        }
        self.reset_pending(session_id);
        self.store_digest(session_id, &entries).await
    }

    /// Most recent `limit` conversation turns, oldest first.
    pub async fn session_history(&self, session_id: &str, limit: usize) -> Vec<Memory> {
        let turns: Vec<Memory> = self
            .short_term
            .get(session_id)
            .await
            .into_iter()
            .filter(|m| matches!(m.role, Some(Role::User | Role::Assistant)))
            .collect();
        let skip = turns.len().saturating_sub(limit);
        turns.into_iter().skip(skip).collect()
    }

    /// Drop a session's short-term and working state. Long-term is kept.
    pub async fn clear_session(&self, session_id: &str) {
        self.short_term.clear(session_id).await;
        self.working.clear(session_id).await;
        self.reset_pending(session_id);
        debug!(session_id, "Cleared session memory");
    }

    async fn compress_recent(&self, session_id: &str) -> Result<Option<String>, MemoryError> {
        let entries = self.short_term.get(session_id).await;
        let start = entries.len().saturating_sub(self.compression_threshold);
        self.store_digest(session_id, &entries[start..]).await
    }

    async fn store_digest(
        &self,
        session_id: &str,
        entries: &[Memory],
    ) -> Result<Option<String>, MemoryError> {
        let Some(long_term) = &self.long_term else {
            debug!(session_id, "No long-term tier, skipping compression");
            return Ok(None);
        };
        if entries.is_empty() {
            return Ok(None);
        }

        let digest = Memory::new(session_id, MemoryKind::Compressed, self.compressor.compress(entries))
            .with_importance(COMPRESSED_IMPORTANCE)
            .with_metadata("source_count", entries.len());
        let id = long_term.store(digest).await?;
        debug!(session_id, memory_id = %id, source_count = entries.len(), "Stored session digest");
        Ok(Some(id))
    }

    /// Count a short-term write; true when the threshold is reached.
    fn bump_pending(&self, session_id: &str) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let count = pending.entry(session_id.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.compression_threshold {
            *count = 0;
            true
        } else {
            false
        }
    }

    fn reset_pending(&self, session_id: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(session_id);
    }
}

fn working_to_memory(session_id: &str, key: &str, entry: WorkingEntry) -> Memory {
    let content = match entry.value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    let mut memory = Memory::new(session_id, MemoryKind::Working, content)
        .with_importance(WORKING_IMPORTANCE)
        .with_metadata("key", key);
    memory.id = format!("working:{key}");
    memory.created_at = entry.written_at;
    memory.accessed_at = entry.written_at;
    memory
}

/// relevance × importance
pub fn score(memory: &Memory, query: &str, now: DateTime<Utc>) -> f32 {
    relevance(memory, query, now) * memory.importance
}

fn relevance(memory: &Memory, query: &str, now: DateTime<Utc>) -> f32 {
    if memory.content == query {
        return 1.0;
    }
    let hours = now
        .signed_duration_since(memory.accessed_at)
        .num_seconds()
        .max(0) as f32
        / 3600.0;
    0.5 * (-hours / 24.0).exp()
}
