//! Cached view of the tools a [`ToolProtocol`] offers.
//!
//! Discovery runs once, on first use. `refresh` re-runs it and swaps the
//! cache; a failed refresh keeps the previous listing.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use vireo_core::error::ToolError;
use vireo_core::tool::{ToolDescriptor, ToolProtocol};

pub struct ToolCatalog {
    protocol: Arc<dyn ToolProtocol>,
    cache: RwLock<Option<Arc<Vec<ToolDescriptor>>>>,
}

impl ToolCatalog {
    pub fn new(protocol: Arc<dyn ToolProtocol>) -> Self {
        Self {
            protocol,
            cache: RwLock::new(None),
        }
    }

    pub fn protocol(&self) -> &Arc<dyn ToolProtocol> {
        &self.protocol
    }

    /// The current listing, discovering it if nothing is cached yet.
    pub async fn tools(&self) -> Result<Arc<Vec<ToolDescriptor>>, ToolError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let mut cache = self.cache.write().await;
        // Another caller may have filled it while we waited.
        if let Some(cached) = cache.as_ref() {
            return Ok(cached.clone());
        }
        let listed = Arc::new(self.protocol.discover().await?);
        info!(protocol = self.protocol.name(), count = listed.len(), "Tool catalog loaded");
        *cache = Some(listed.clone());
        Ok(listed)
    }

    /// Re-run discovery and replace the cached listing.
    pub async fn refresh(&self) -> Result<Arc<Vec<ToolDescriptor>>, ToolError> {
        match self.protocol.discover().await {
            Ok(tools) => {
                let listed = Arc::new(tools);
                info!(protocol = self.protocol.name(), count = listed.len(), "Tool catalog refreshed");
                *self.cache.write().await = Some(listed.clone());
                Ok(listed)
            }
            Err(e) => {
                warn!(protocol = self.protocol.name(), error = %e, "Tool catalog refresh failed");
                Err(e)
            }
        }
    }

    pub async fn get(&self, name: &str) -> Result<Option<ToolDescriptor>, ToolError> {
        Ok(self.tools().await?.iter().find(|t| t.name == name).cloned())
    }

    pub async fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.protocol.invoke(name, params).await
    }
}
