//! Long-term tier — embedded, searchable, durable until deleted.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vireo_core::error::MemoryError;
use vireo_core::memory::{Embedder, Memory, MetadataStore, VectorStore};

/// Default bound on one long-term store or search, embedding included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LongTermStore {
    vectors: Arc<dyn VectorStore>,
    metadata: Arc<dyn MetadataStore>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl LongTermStore {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        metadata: Arc<dyn MetadataStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            vectors,
            metadata,
            embedder,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound every `store` and `search`, embedding included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Embed (if needed), index, and record a memory.
    pub async fn store(&self, memory: Memory) -> Result<String, MemoryError> {
        bounded(self.timeout, "store", self.store_unbounded(memory)).await
    }

    /// Semantic search, optionally restricted to one session.
    ///
    /// Over-fetches `top_k * 2` candidates so session filtering still leaves
    /// enough hits. Every returned record has its access stats bumped.
    pub async fn search(
        &self,
        query: &str,
        session_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        bounded(self.timeout, "search", self.search_unbounded(query, session_filter, top_k)).await
    }

    async fn store_unbounded(&self, mut memory: Memory) -> Result<String, MemoryError> {
        let needs_embedding = memory.embedding.as_ref().is_none_or(|v| v.is_empty());
        if needs_embedding {
            memory.embedding = Some(self.embedder.embed(&memory.content).await?);
        }
        let vector = memory.embedding.clone().unwrap_or_default();

        let mut payload = serde_json::Map::new();
        payload.insert("session_id".into(), memory.session_id.clone().into());
        payload.insert("kind".into(), memory.kind.as_str().into());

        self.vectors.insert(&memory.id, vector, payload).await?;
        self.metadata.save(&memory).await?;

        debug!(
            memory_id = %memory.id,
            session_id = %memory.session_id,
            kind = memory.kind.as_str(),
            vector_store = self.vectors.name(),
            "Stored long-term memory"
        );
        Ok(memory.id)
    }

    async fn search_unbounded(
        &self,
        query: &str,
        session_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let hits = self.vectors.search(&query_vector, top_k * 2).await?;

        let mut results = Vec::with_capacity(top_k);
        for hit in hits {
            let Some(mut memory) = self.metadata.get(&hit.id).await? else {
                continue;
            };
            if session_filter.is_some_and(|s| !s.is_empty() && memory.session_id != s) {
                continue;
            }

            memory.accessed_at = Utc::now();
            memory.access_count += 1;
            if let Err(e) = self.metadata.save(&memory).await {
                warn!(memory_id = %memory.id, error = %e, "Failed to record memory access");
            }

            results.push(memory);
            if results.len() >= top_k {
                break;
            }
        }

        Ok(results)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        self.metadata.get(id).await
    }

    pub async fn by_session(&self, session_id: &str) -> Result<Vec<Memory>, MemoryError> {
        self.metadata.by_session(session_id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let indexed = self.vectors.delete(id).await?;
        let recorded = self.metadata.delete(id).await?;
        Ok(indexed || recorded)
    }
}

/// Run an embedding-backed store call under `timeout`.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T, MemoryError>>,
) -> Result<T, MemoryError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            let timeout_ms = timeout.as_millis() as u64;
            warn!(operation, timeout_ms, "Embedding-backed store call timed out");
            Err(MemoryError::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::{InMemoryMetadataStore, InMemoryVectorStore};
    use crate::test_helpers::{HangingEmbedder, KeywordEmbedder};
    use vireo_core::memory::MemoryKind;

    fn store() -> LongTermStore {
        LongTermStore::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(KeywordEmbedder),
        )
    }

    #[tokio::test]
    async fn store_generates_embedding() {
        let lt = store();
        let id = lt
            .store(Memory::new("s", MemoryKind::LongTerm, "rust ownership"))
            .await
            .unwrap();
        let saved = lt.get(&id).await.unwrap().unwrap();
        assert!(saved.embedding.is_some());
    }

    #[tokio::test]
    async fn search_filters_by_session_and_bumps_access() {
        let lt = store();
        let mine = lt
            .store(Memory::new("me", MemoryKind::LongTerm, "rust ownership rules"))
            .await
            .unwrap();
        lt.store(Memory::new("you", MemoryKind::LongTerm, "rust borrow checker"))
            .await
            .unwrap();

        let found = lt.search("rust", Some("me"), 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, mine);
        assert_eq!(found[0].access_count, 1);

        let again = lt.get(&mine).await.unwrap().unwrap();
        assert_eq!(again.access_count, 1);

        let everyone = lt.search("rust", None, 5).await.unwrap();
        assert_eq!(everyone.len(), 2);
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let lt = store();
        for i in 0..4 {
            lt.store(Memory::new("s", MemoryKind::LongTerm, format!("rust note {i}")))
                .await
                .unwrap();
        }
        assert_eq!(lt.search("rust", Some("s"), 2).await.unwrap().len(), 2);
        assert!(lt.search("rust", Some("s"), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_both_sides() {
        let lt = store();
        let id = lt
            .store(Memory::new("s", MemoryKind::LongTerm, "temporary"))
            .await
            .unwrap();
        assert!(lt.delete(&id).await.unwrap());
        assert!(lt.get(&id).await.unwrap().is_none());
        assert!(lt.by_session("s").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_embedder_times_out() {
        let lt = LongTermStore::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(HangingEmbedder),
        )
        .with_timeout(Duration::from_secs(2));

        let err = lt
            .store(Memory::new("s", MemoryKind::LongTerm, "never embedded"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Timeout { ref operation, timeout_ms: 2000 } if operation == "store"));

        let err = lt.search("anything", Some("s"), 3).await.unwrap_err();
        assert!(matches!(err, MemoryError::Timeout { ref operation, .. } if operation == "search"));
        assert!(lt.by_session("s").await.unwrap().is_empty());
    }
}
