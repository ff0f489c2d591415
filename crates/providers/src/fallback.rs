//! Provider fallback — ordered retry chain with per-provider timeouts.
//!
//! When an endpoint fails (timeout, rate limit, error) the next one in the
//! chain gets the same request. The last error wins if every entry fails.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vireo_core::error::ProviderError;
use vireo_core::provider::*;

/// A provider that wraps an ordered list of providers and falls back on failure.
pub struct FallbackProvider {
    name: String,
    chain: Vec<FallbackEntry>,
}

struct FallbackEntry {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl FallbackProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Append a provider with its own deadline.
    pub fn add(mut self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry { provider, timeout });
        self
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Run `op` against each entry in order until one succeeds.
    async fn try_chain<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T, ProviderError>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = ProviderError::NotConfigured("No providers in fallback chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let provider_name = entry.provider.name().to_string();
            info!(
                provider = %provider_name,
                op = op_name,
                attempt = i + 1,
                total = self.chain.len(),
                "Fallback: trying provider"
            );

            match tokio::time::timeout(entry.timeout, op(entry.provider.clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!(provider = %provider_name, op = op_name, error = %e, "Fallback: provider failed, trying next");
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        provider = %provider_name,
                        op = op_name,
                        timeout_ms = entry.timeout.as_millis() as u64,
                        "Fallback: provider timed out, trying next"
                    );
                    last_error = ProviderError::Timeout(format!(
                        "Provider '{provider_name}' {op_name} timed out after {}ms",
                        entry.timeout.as_millis()
                    ));
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.try_chain("complete", |p| {
            let request = request.clone();
            async move { p.complete(request).await }
        })
        .await
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.try_chain("embed", |p| {
            let request = request.clone();
            async move { p.embed(request).await }
        })
        .await
    }
}
