//! Deterministic embedder for tests.

use async_trait::async_trait;
use std::time::Duration;
use vireo_core::error::MemoryError;
use vireo_core::memory::Embedder;

const VOCABULARY: [&str; 6] = ["rust", "python", "video", "music", "cooking", "travel"];

/// Bag-of-keywords embedding over a tiny fixed vocabulary, plus a constant
/// bias dimension so no vector is all zeros.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCABULARY
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect();
        v.push(0.1);
        Ok(v)
    }
}

/// Always fails, for exercising persistence errors.
pub struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
        Err(MemoryError::EmbeddingFailed("embedding service offline".into()))
    }
}

/// Never answers.
pub struct HangingEmbedder;

#[async_trait]
impl Embedder for HangingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(MemoryError::EmbeddingFailed("unreachable".into()))
    }
}
