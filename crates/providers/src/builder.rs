//! Build the configured provider stack.

use std::sync::Arc;
use std::time::Duration;
use vireo_config::AppConfig;
use vireo_core::error::ProviderError;
use vireo_core::provider::Provider;

use crate::fallback::FallbackProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider described by `config.provider`.
///
/// A single endpoint is returned as-is. With `fallback_urls` configured the
/// primary and every fallback are chained, each bounded by the longest stage
/// timeout so a stuck endpoint cannot eat the whole request budget.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider_config = &config.provider;
    let api_key = provider_config.api_key.clone().unwrap_or_else(|| "none".into());
    let http_timeout = config.pipeline.request_timeout();

    let primary: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::new(
        &provider_config.name,
        &provider_config.api_url,
        &api_key,
        http_timeout,
    )?);

    if provider_config.fallback_urls.is_empty() {
        return Ok(primary);
    }

    let per_entry = longest_stage_timeout(config);
    let mut chain = FallbackProvider::new(format!("{}+fallback", provider_config.name))
        .add(primary, per_entry);

    for (i, url) in provider_config.fallback_urls.iter().enumerate() {
        let fallback = OpenAiCompatProvider::new(
            format!("{}-fallback-{}", provider_config.name, i + 1),
            url,
            &api_key,
            http_timeout,
        )?;
        chain = chain.add(Arc::new(fallback), per_entry);
    }

    Ok(Arc::new(chain))
}

fn longest_stage_timeout(config: &AppConfig) -> Duration {
    let p = &config.pipeline;
    [
        p.intent_timeout(),
        p.selection_timeout(),
        p.synthesis_timeout(),
        p.chat_timeout(),
    ]
    .into_iter()
    .max()
    .unwrap_or_else(|| p.request_timeout())
}
