//! Shared test doubles for pipeline tests.

use async_trait::async_trait;
use base64::Engine;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vireo_core::error::{MemoryError, ProviderError, ToolError};
use vireo_core::memory::Embedder;
use vireo_core::message::Message;
use vireo_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use vireo_core::tool::{ToolDescriptor, ToolProtocol};
use vireo_memory::{
    DocumentStore, InMemoryMetadataStore, InMemoryVectorStore, LongTermStore, MemoryManager,
    ShortTermStore, WorkingStore,
};

/// Returns scripted replies in order and records every request.
///
/// Once the script runs out every call fails with a 500.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(make_text_response(&text, &model)),
            Some(Err(e)) => Err(e),
            None => Err(ProviderError::ApiError {
                status_code: 500,
                message: "script exhausted".into(),
            }),
        }
    }
}

/// Fails every call with a network error.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Never answers.
pub struct HangingProvider;

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderError::Timeout("unreachable".into()))
    }
}

/// Answers the classifier with `general_chat` and echoes every other
/// request's last message. Safe to share between concurrent turns.
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::task::yield_now().await;
        let classifying = request
            .messages
            .first()
            .is_some_and(|m| m.content.starts_with("You classify"));
        let text = if classifying {
            r#"{"type":"general_chat","confidence":0.99}"#.to_string()
        } else {
            let last = request.messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            format!("re: {last}")
        };
        Ok(make_text_response(&text, &request.model))
    }
}

pub fn make_text_response(text: &str, model: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: model.into(),
    }
}

/// A tool endpoint with a fixed catalog and canned results.
pub struct StaticTools {
    descriptors: Vec<ToolDescriptor>,
    results: HashMap<String, Result<serde_json::Value, ToolError>>,
    delays: HashMap<String, Duration>,
    discover_error: Option<ToolError>,
    invocations: Mutex<Vec<(String, serde_json::Value)>>,
}

impl StaticTools {
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Self {
        Self {
            descriptors,
            results: HashMap::new(),
            delays: HashMap::new(),
            discover_error: None,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// An endpoint whose discovery always fails.
    pub fn unreachable() -> Self {
        let mut tools = Self::new(Vec::new());
        tools.discover_error = Some(ToolError::Protocol("connection refused".into()));
        tools
    }

    pub fn with_result(
        mut self,
        name: &str,
        result: Result<serde_json::Value, ToolError>,
    ) -> Self {
        self.results.insert(name.to_string(), result);
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn invocations(&self) -> Vec<(String, serde_json::Value)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolProtocol for StaticTools {
    fn name(&self) -> &str {
        "static"
    }

    async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        match &self.discover_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.descriptors.clone()),
        }
    }

    async fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), params));
        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }
        self.results
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(ToolError::NotFound(name.to_string())))
    }
}

pub fn video_info_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "video_info",
        "Fetch statistics and metadata for one video",
        serde_json::json!({
            "type": "object",
            "properties": { "bvid": { "type": "string", "description": "video identifier" } },
            "required": ["bvid"]
        }),
    )
}

/// A tool result wrapped the way remote endpoints return it: the payload
/// base64-encoded inside `content[0].text`.
pub fn video_envelope(view_count: i64) -> serde_json::Value {
    let payload = serde_json::json!({
        "code": 0,
        "data": {
            "video": {
                "title": "Rust in 100 seconds",
                "description": "A quick tour",
                "view_count": view_count,
                "like_count": 321,
                "comment_count": "45",
                "author": { "username": "ferris" }
            }
        }
    });
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload.to_string());
    serde_json::json!({ "content": [{ "type": "text", "text": encoded }] })
}

/// Embeds by keyword presence so similar texts land near each other.
pub struct KeywordEmbedder;

const VOCAB: [&str; 6] = ["rust", "python", "video", "music", "cooking", "travel"];

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let lower = text.to_lowercase();
        Ok(VOCAB
            .iter()
            .map(|w| if lower.contains(w) { 1.0 } else { 0.1 })
            .collect())
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

/// Memory manager with all three tiers in process.
pub fn memory_manager() -> Arc<MemoryManager> {
    memory_manager_with(Arc::new(KeywordEmbedder))
}

pub fn memory_manager_with(embedder: Arc<dyn Embedder>) -> Arc<MemoryManager> {
    let long_term = LongTermStore::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(InMemoryMetadataStore::new()),
        embedder,
    );
    Arc::new(
        MemoryManager::new(
            ShortTermStore::new(100, Duration::from_secs(3600)),
            WorkingStore::new(8),
        )
        .with_long_term(long_term),
    )
}

pub fn document_store() -> Arc<DocumentStore> {
    Arc::new(DocumentStore::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(KeywordEmbedder),
    ))
}
