//! Embeddings through a [`Provider`].

use async_trait::async_trait;
use std::sync::Arc;
use vireo_core::error::MemoryError;
use vireo_core::memory::Embedder;
use vireo_core::provider::{EmbeddingRequest, Provider};

/// Adapts a provider's `/embeddings` endpoint to the memory tier's
/// [`Embedder`] seam.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MemoryError::EmbeddingFailed("provider returned no embedding".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vireo_core::error::ProviderError;
    use vireo_core::message::Message;
    use vireo_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    struct LengthEmbedder;

    #[async_trait]
    impl Provider for LengthEmbedder {
        fn name(&self) -> &str {
            "length"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(""),
                usage: None,
                model: request.model,
            })
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: request
                    .inputs
                    .iter()
                    .map(|t| if t.is_empty() { vec![] } else { vec![t.len() as f32, 1.0] })
                    .collect(),
                model: request.model,
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn embeds_single_text() {
        let embedder = ProviderEmbedder::new(Arc::new(LengthEmbedder), "nomic-embed-text");
        assert_eq!(embedder.embed("abcd").await.unwrap(), vec![4.0, 1.0]);
    }

    #[tokio::test]
    async fn empty_vector_is_an_error() {
        let embedder = ProviderEmbedder::new(Arc::new(LengthEmbedder), "nomic-embed-text");
        assert!(matches!(
            embedder.embed("").await.unwrap_err(),
            MemoryError::EmbeddingFailed(_)
        ));
    }
}
