//! Document knowledge base: reference text the knowledge branch answers from.
//!
//! Documents are embedded once on ingest and indexed in a [`VectorStore`];
//! the full records live in this store. Unlike conversation memories they
//! are not scoped to a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use vireo_core::error::MemoryError;
use vireo_core::memory::{Embedder, VectorStore};

use crate::long_term::{DEFAULT_TIMEOUT, bounded};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A document and its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentHit {
    #[serde(flatten)]
    pub document: Document,
    pub score: f32,
}

pub struct DocumentStore {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    documents: RwLock<HashMap<String, Document>>,
    timeout: Duration,
}

impl DocumentStore {
    pub fn new(vectors: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vectors,
            embedder,
            documents: RwLock::new(HashMap::new()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound every `add` and `search`, embedding included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Embed and index a new document.
    pub async fn add(
        &self,
        content: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Document, MemoryError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(MemoryError::Storage("document content must not be empty".into()));
        }
        let document = Document {
            id: format!("doc-{}", Uuid::new_v4()),
            content,
            metadata,
            created_at: Utc::now(),
        };
        bounded(self.timeout, "document add", self.index(&document)).await?;

        self.documents
            .write()
            .await
            .insert(document.id.clone(), document.clone());
        info!(document_id = %document.id, len = document.content.len(), "Document added");
        Ok(document)
    }

    /// The `top_k` documents closest to `query`, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<DocumentHit>, MemoryError> {
        if top_k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }
        let hits = bounded(self.timeout, "document search", async {
            let vector = self.embedder.embed(query).await?;
            self.vectors.search(&vector, top_k).await
        })
        .await?;

        let documents = self.documents.read().await;
        let found: Vec<DocumentHit> = hits
            .into_iter()
            .filter_map(|hit| {
                documents.get(&hit.id).map(|d| DocumentHit {
                    document: d.clone(),
                    score: hit.score,
                })
            })
            .collect();
        debug!(hits = found.len(), top_k, "Document search");
        Ok(found)
    }

    pub async fn get(&self, id: &str) -> Option<Document> {
        self.documents.read().await.get(id).cloned()
    }

    /// Every document, oldest first.
    pub async fn list(&self) -> Vec<Document> {
        let mut all: Vec<Document> = self.documents.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let removed = self.documents.write().await.remove(id).is_some();
        if removed {
            self.vectors.delete(id).await?;
            info!(document_id = id, "Document deleted");
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    async fn index(&self, document: &Document) -> Result<(), MemoryError> {
        let vector = self.embedder.embed(&document.content).await?;
        let mut payload = document.metadata.clone();
        payload.insert("kind".into(), "document".into());
        self.vectors.insert(&document.id, vector, payload).await
    }
}
