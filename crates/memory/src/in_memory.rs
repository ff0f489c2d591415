//! In-memory vector and metadata stores — the default long-term backing and
//! the test double for external ones.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vireo_core::error::MemoryError;
use vireo_core::memory::{Memory, MetadataStore, VectorHit, VectorStore};

use crate::vector::rank_by_similarity;

/// Brute-force cosine search over vectors held in a map.
pub struct InMemoryVectorStore {
    vectors: Arc<RwLock<HashMap<String, Vec<f32>>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            vectors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(
        &self,
        id: &str,
        vector: Vec<f32>,
        _payload: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), MemoryError> {
        if vector.is_empty() {
            return Err(MemoryError::Storage(format!("empty vector for '{id}'")));
        }
        self.vectors.write().await.insert(id.to_string(), vector);
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, MemoryError> {
        let vectors = self.vectors.read().await;
        Ok(rank_by_similarity(vectors.iter(), vector, top_k))
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        Ok(self.vectors.write().await.remove(id).is_some())
    }
}

/// Full memory records keyed by id.
pub struct InMemoryMetadataStore {
    records: Arc<RwLock<HashMap<String, Memory>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn save(&self, memory: &Memory) -> Result<(), MemoryError> {
        self.records
            .write()
            .await
            .insert(memory.id.clone(), memory.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn by_session(&self, session_id: &str) -> Result<Vec<Memory>, MemoryError> {
        let records = self.records.read().await;
        let mut found: Vec<Memory> = records
            .values()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.created_at);
        Ok(found)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        Ok(self.records.write().await.remove(id).is_some())
    }
}
