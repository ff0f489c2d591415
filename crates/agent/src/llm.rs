//! Thin wrapper over a [`Provider`] used by every pipeline stage.
//!
//! Each call carries its own deadline. The deadline is applied with
//! `tokio::time::timeout`, so the in-flight request is dropped when it fires.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use vireo_core::error::{ProviderError, StageError};
use vireo_core::message::Message;
use vireo_core::provider::{Provider, ProviderRequest};

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl CompletionError {
    /// Convert into the stage error for `stage`. Timeouts keep their own
    /// variant; everything else goes through `wrap`.
    pub fn into_stage(self, stage: &str, wrap: fn(String) -> StageError) -> StageError {
        match self {
            CompletionError::Timeout { timeout_ms } => StageError::Timeout {
                stage: stage.to_string(),
                timeout_ms,
            },
            CompletionError::Provider(e) => wrap(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one completion under `deadline` and return the reply text.
    pub async fn complete(
        &self,
        stage: &str,
        messages: Vec<Message>,
        deadline: Duration,
    ) -> Result<String, CompletionError> {
        let mut request =
            ProviderRequest::new(self.model.clone(), messages).with_temperature(self.temperature);
        request.max_tokens = self.max_tokens;

        let started = Instant::now();
        let outcome = tokio::time::timeout(deadline, self.provider.complete(request)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(response)) => {
                debug!(
                    stage,
                    provider = self.provider.name(),
                    duration_ms,
                    reply_len = response.message.content.len(),
                    "Model replied"
                );
                Ok(response.message.content)
            }
            Ok(Err(e)) => {
                warn!(stage, provider = self.provider.name(), duration_ms, error = %e, "Model call failed");
                Err(CompletionError::Provider(e))
            }
            Err(_) => {
                let timeout_ms = deadline.as_millis() as u64;
                warn!(stage, provider = self.provider.name(), timeout_ms, "Model call timed out");
                Err(CompletionError::Timeout { timeout_ms })
            }
        }
    }
}

/// The text between the first `{` and the last `}`, inclusive.
///
/// Models often wrap JSON in prose or code fences.
pub fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{HangingProvider, ScriptedProvider};

    #[test]
    fn json_span_strips_prose_and_fences() {
        let text = "Sure! ```json\n{\"a\": {\"b\": 1}}\n``` hope that helps";
        assert_eq!(json_object_span(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(json_object_span("no json here"), None);
        assert_eq!(json_object_span("} backwards {"), None);
    }

    #[tokio::test]
    async fn complete_returns_reply_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("pong".into())]));
        let client = ModelClient::new(provider.clone(), "mock-model").with_temperature(0.1);

        let reply = client
            .complete("test", vec![Message::user("ping")], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, "pong");

        let request = provider.last_request().unwrap();
        assert_eq!(request.model, "mock-model");
        assert!((request.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn complete_times_out() {
        let client = ModelClient::new(Arc::new(HangingProvider), "mock-model");
        let err = client
            .complete("intent", vec![Message::user("ping")], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Timeout { timeout_ms: 20 }));

        match err.into_stage("intent", StageError::Classification) {
            StageError::Timeout { stage, timeout_ms } => {
                assert_eq!(stage, "intent");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("Expected Timeout, got: {other:?}"),
        }
    }

    #[test]
    fn provider_errors_use_stage_wrapper() {
        let err = CompletionError::Provider(ProviderError::Network("refused".into()));
        assert!(matches!(
            err.into_stage("selection", StageError::ToolSelection),
            StageError::ToolSelection(_)
        ));
    }
}
