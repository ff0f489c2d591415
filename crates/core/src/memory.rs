//! Memory domain types and the storage seams behind the long-term tier.
//!
//! A [`Memory`] is one remembered item. Which tier it lands in is decided by
//! its [`MemoryKind`] and importance; the tiers themselves live in
//! `vireo-memory`. The traits here are the external collaborators the
//! long-term tier needs: a vector index, a metadata store, an embedder.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::MemoryError;
use crate::message::Role;

/// Which tier a memory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Recent conversation turns, bounded and expiring.
    ShortTerm,
    /// Per-session scratch values. Never persisted beyond the working set.
    Working,
    /// Durable, embedded, searchable.
    LongTerm,
    /// A digest produced from a run of short-term memories.
    Compressed,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::ShortTerm => "short_term",
            MemoryKind::Working => "working",
            MemoryKind::LongTerm => "long_term",
            MemoryKind::Compressed => "compressed",
        }
    }
}

/// A single remembered item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,

    pub session_id: String,

    pub kind: MemoryKind,

    /// Speaker, for memories that record a conversation turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    pub content: String,

    /// Embedding vector; generated on long-term store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// 0.0..=1.0. Anything above 0.7 is also written to the long-term tier.
    #[serde(default)]
    pub importance: f32,

    pub created_at: DateTime<Utc>,

    pub accessed_at: DateTime<Utc>,

    #[serde(default)]
    pub access_count: u32,

    /// Per-item TTL override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Memory {
    pub fn new(session_id: impl Into<String>, kind: MemoryKind, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            kind,
            role: None,
            content: content.into(),
            embedding: None,
            importance: 0.0,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            ttl_secs: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// A conversation turn destined for the short-term tier.
    pub fn turn(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self::new(session_id, MemoryKind::ShortTerm, content).with_role(role)
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this memory qualifies for the long-term tier.
    pub fn is_important(&self) -> bool {
        self.importance > LONG_TERM_IMPORTANCE_THRESHOLD
    }
}

/// Importance above which a memory is also written to the long-term tier.
pub const LONG_TERM_IMPORTANCE_THRESHOLD: f32 = 0.7;

/// One hit from a vector similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

/// Vector index used by the long-term tier.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    async fn insert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<(), MemoryError>;

    /// Nearest neighbours of `vector`, best first.
    async fn search(&self, vector: &[f32], top_k: usize) -> std::result::Result<Vec<VectorHit>, MemoryError>;

    async fn delete(&self, id: &str) -> std::result::Result<bool, MemoryError>;
}

/// Full-record store keyed by memory id.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, memory: &Memory) -> std::result::Result<(), MemoryError>;

    async fn get(&self, id: &str) -> std::result::Result<Option<Memory>, MemoryError>;

    async fn by_session(&self, session_id: &str) -> std::result::Result<Vec<Memory>, MemoryError>;

    async fn delete(&self, id: &str) -> std::result::Result<bool, MemoryError>;
}

/// Text → vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, MemoryError>;
}
