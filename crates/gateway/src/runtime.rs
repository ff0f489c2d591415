//! Wire the pipeline from configuration.

use std::sync::Arc;
use tracing::{info, warn};

use vireo_agent::Orchestrator;
use vireo_config::AppConfig;
use vireo_core::error::Error;
use vireo_core::tool::{ToolProtocol, ToolRegistry};
use vireo_memory::{
    DocumentStore, InMemoryMetadataStore, InMemoryVectorStore, LongTermStore, MemoryManager,
    ShortTermStore, WorkingStore,
};
use vireo_providers::ProviderEmbedder;
use vireo_tools::{RemoteToolClient, ToolCatalog};

/// Build the orchestrator and everything it depends on.
///
/// The long-term tier and the document store are only wired when an
/// embedding model is configured.
/// Without a tool endpoint the catalog is an empty in-process registry.
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator, Error> {
    config.validate().map_err(|e| Error::Config {
        message: e.to_string(),
    })?;

    let provider = vireo_providers::build_from_config(config)?;

    let mut memory = MemoryManager::new(
        ShortTermStore::new(config.memory.short_term_max_items, config.memory.short_term_ttl()),
        WorkingStore::new(config.memory.working_max_size),
    )
    .with_compression_threshold(config.memory.compression_threshold);

    match (&config.provider.embedding_model, config.long_term_available()) {
        (Some(model), true) => {
            memory = memory.with_long_term(
                LongTermStore::new(
                    Arc::new(InMemoryVectorStore::new()),
                    Arc::new(InMemoryMetadataStore::new()),
                    Arc::new(ProviderEmbedder::new(provider.clone(), model.clone())),
                )
                .with_timeout(config.memory.long_term_timeout()),
            );
            info!(embedding_model = %model, "Long-term memory enabled");
        }
        _ if config.memory.long_term_enabled => {
            warn!("Long-term memory requested but no embedding model configured; disabled");
        }
        _ => {}
    }

    let protocol: Arc<dyn ToolProtocol> = match &config.tools.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "Using remote tool endpoint");
            Arc::new(RemoteToolClient::new(
                endpoint.clone(),
                config.tools.discovery_timeout(),
                config.pipeline.tool_call_timeout(),
            )?)
        }
        None => {
            info!("No tool endpoint configured; tool-augmented turns will run without tools");
            Arc::new(ToolRegistry::new())
        }
    };

    let documents = config.provider.embedding_model.as_ref().map(|model| {
        Arc::new(
            DocumentStore::new(
                Arc::new(InMemoryVectorStore::new()),
                Arc::new(ProviderEmbedder::new(provider.clone(), model.clone())),
            )
            .with_timeout(config.memory.long_term_timeout()),
        )
    });

    let mut orchestrator = Orchestrator::new(
        provider,
        Arc::new(memory),
        Arc::new(ToolCatalog::new(protocol)),
        config,
    );
    if let Some(documents) = documents {
        orchestrator = orchestrator.with_documents(documents);
    }
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let orchestrator = build_orchestrator(&AppConfig::default()).unwrap();
        assert!(orchestrator.memory().long_term().is_some());
        assert!(orchestrator.documents().is_some());
        assert_eq!(orchestrator.catalog().protocol().name(), "local");
    }

    #[test]
    fn no_embedding_model_disables_long_term() {
        let mut config = AppConfig::default();
        config.provider.embedding_model = None;
        let orchestrator = build_orchestrator(&config).unwrap();
        assert!(orchestrator.memory().long_term().is_none());
        assert!(orchestrator.documents().is_none());
    }

    #[test]
    fn memory_timeout_reaches_long_term_tier() {
        let mut config = AppConfig::default();
        config.memory.long_term_timeout_secs = 2;
        let orchestrator = build_orchestrator(&config).unwrap();
        let long_term = orchestrator.memory().long_term().unwrap();
        assert_eq!(long_term.timeout(), std::time::Duration::from_secs(2));
    }

    #[test]
    fn tool_endpoint_selects_remote_client() {
        let mut config = AppConfig::default();
        config.tools.endpoint = Some("http://127.0.0.1:9/rpc".into());
        let orchestrator = build_orchestrator(&config).unwrap();
        assert_eq!(orchestrator.catalog().protocol().name(), "remote");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.intent_timeout_secs = config.pipeline.request_timeout_secs;
        assert!(matches!(build_orchestrator(&config), Err(Error::Config { .. })));
    }
}
