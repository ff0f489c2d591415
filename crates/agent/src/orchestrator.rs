//! The request pipeline.
//!
//! One call to [`Orchestrator::execute`] handles one user message:
//!
//! 1. **Remember** the user turn
//! 2. **Classify** the utterance and resolve the active video identifier
//! 3. **Route** the intent to a branch
//! 4. **Run** the branch's stages in order:
//!    tool-augmented turns select tools, execute them, then synthesize;
//!    direct turns synthesize straight from context
//! 5. **Remember** the assistant turn and return the reply
//!
//! Every stage has its own deadline and the whole turn runs under the
//! request deadline. Stage failures take that stage's fallback path and are
//! recorded in the output metadata.

use crate::context::ContextBuilder;
use crate::executor::ToolExecutor;
use crate::intent::{IntentClassifier, extract_identifier};
use crate::llm::ModelClient;
use crate::router::{Branch, route};
use crate::selector::ToolSelector;
use crate::state::PipelineState;
use crate::synthesizer::ResponseSynthesizer;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vireo_config::AppConfig;
use vireo_core::error::Error;
use vireo_core::event::{DomainEvent, EventBus};
use vireo_core::intent::IntentKind;
use vireo_core::memory::{Memory, MemoryKind};
use vireo_core::message::{Message, Role};
use vireo_core::provider::Provider;
use vireo_memory::{DocumentHit, DocumentStore, MemoryManager};
use vireo_tools::ToolCatalog;

/// Working-memory key holding the session's current video identifier.
pub const ACTIVE_IDENTIFIER_KEY: &str = "active_identifier";

const USER_TURN_IMPORTANCE: f32 = 0.5;
const PLAIN_REPLY_IMPORTANCE: f32 = 0.5;
/// Replies backed by tool data are kept long-term.
const GROUNDED_REPLY_IMPORTANCE: f32 = 0.8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutput {
    pub session_id: String,
    pub reply: String,
    pub intent: String,
    pub agent: String,
    pub timestamp_ms: i64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ToolSelection,
    ToolExecution,
    Synthesis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ToolSelection => "tool_selection",
            Stage::ToolExecution => "tool_execution",
            Stage::Synthesis => "synthesis",
        }
    }
}

/// The stages a branch runs, in order.
pub fn plan(branch: Branch) -> &'static [Stage] {
    match branch {
        Branch::ToolAugmented => &[Stage::ToolSelection, Stage::ToolExecution, Stage::Synthesis],
        Branch::Knowledge | Branch::GeneralChat => &[Stage::Synthesis],
    }
}

#[derive(Debug, Clone)]
struct Settings {
    request_timeout: Duration,
    /// Held back from synthesis for the long-term writes that follow it.
    memory_reserve: Duration,
    history_turns: usize,
    retrieval_top_k: usize,
    context_max_tokens: usize,
}

pub struct Orchestrator {
    classifier: IntentClassifier,
    selector: ToolSelector,
    executor: ToolExecutor,
    synthesizer: ResponseSynthesizer,
    memory: Arc<MemoryManager>,
    documents: Option<Arc<DocumentStore>>,
    catalog: Arc<ToolCatalog>,
    events: Arc<EventBus>,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        memory: Arc<MemoryManager>,
        catalog: Arc<ToolCatalog>,
        config: &AppConfig,
    ) -> Self {
        let pipeline = &config.pipeline;
        let llm = ModelClient::new(provider, config.provider.model.clone())
            .with_temperature(config.provider.temperature)
            .with_max_tokens(config.provider.max_tokens);
        let events = Arc::new(EventBus::default());
        // Promotion plus a digest on the assistant write.
        let memory_reserve = memory
            .long_term()
            .map(|lt| lt.timeout() * 2)
            .unwrap_or_default();

        Self {
            classifier: IntentClassifier::new(llm.clone(), pipeline.intent_timeout())
                .with_threshold(pipeline.intent_threshold),
            selector: ToolSelector::new(llm.clone(), catalog.clone(), pipeline.selection_timeout()),
            executor: ToolExecutor::new(catalog.clone(), pipeline.tool_call_timeout())
                .with_max_parallel(pipeline.max_parallel_tools)
                .with_events(events.clone()),
            synthesizer: ResponseSynthesizer::new(llm, pipeline.synthesis_timeout(), pipeline.chat_timeout())
                .with_entity(pipeline.entity.clone()),
            memory,
            documents: None,
            catalog,
            events,
            settings: Settings {
                request_timeout: pipeline.request_timeout(),
                memory_reserve,
                history_turns: pipeline.history_turns,
                retrieval_top_k: pipeline.retrieval_top_k,
                context_max_tokens: pipeline.context_max_tokens,
            },
        }
    }

    /// Ground knowledge answers in an ingested document base.
    pub fn with_documents(mut self, documents: Arc<DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn documents(&self) -> Option<&Arc<DocumentStore>> {
        self.documents.as_ref()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Run one message through the pipeline under the request deadline.
    pub async fn execute(&self, input: ChatInput) -> Result<ChatOutput, Error> {
        let deadline = self.settings.request_timeout;
        match tokio::time::timeout(deadline, self.run(input)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = deadline.as_secs(), "Request deadline exceeded");
                Err(Error::RequestTimeout {
                    timeout_secs: deadline.as_secs(),
                })
            }
        }
    }

    /// Most recent `limit` turns of a session, oldest first.
    pub async fn history(&self, session_id: &str, limit: usize) -> Vec<Memory> {
        self.memory.session_history(session_id, limit).await
    }

    pub async fn clear_session(&self, session_id: &str) {
        self.memory.clear_session(session_id).await;
        info!(session_id, "Session cleared");
    }

    async fn run(&self, input: ChatInput) -> Result<ChatOutput, Error> {
        let message = input.message.trim();
        if message.is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }
        let session_id = input
            .session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.settings.request_timeout;
        let mut state = PipelineState::new(session_id, input.user_id, message);
        info!(session_id = %state.session_id, user_id = %state.user_id, "Pipeline started");
        self.events.publish(DomainEvent::MessageReceived {
            session_id: state.session_id.clone(),
            user_id: state.user_id.clone(),
            content_preview: message.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        let user_turn = Memory::turn(&state.session_id, Role::User, message)
            .with_importance(USER_TURN_IMPORTANCE)
            .with_metadata("user_id", state.user_id.clone());
        let user_turn_id = user_turn.id.clone();
        self.remember(&mut state, user_turn).await;

        self.recognize(&mut state).await;
        self.resolve_identifier(&mut state).await;

        let kind = state
            .intent
            .as_ref()
            .map(|i| i.kind)
            .unwrap_or(IntentKind::GeneralChat);
        let branch = route(kind);
        state.branch = Some(branch);
        state.record("branch", branch.as_str());
        if branch != Branch::ToolAugmented {
            state.record("tool_selection_skipped", true);
        }

        for stage in plan(branch) {
            let stage_started = Instant::now();
            self.run_stage(*stage, &mut state, &user_turn_id, deadline).await?;
            state.record(
                &format!("{}_duration_ms", stage.as_str()),
                stage_started.elapsed().as_millis() as u64,
            );
        }

        let reply = state.final_reply.clone().unwrap_or_default();
        let agent = agent_name(&state);
        let importance = if branch == Branch::ToolAugmented && state.has_tool_data() {
            GROUNDED_REPLY_IMPORTANCE
        } else {
            PLAIN_REPLY_IMPORTANCE
        };
        let assistant_turn = Memory::turn(&state.session_id, Role::Assistant, reply.clone())
            .with_importance(importance)
            .with_metadata("user_id", state.user_id.clone())
            .with_metadata("intent", state.intent_label())
            .with_metadata("agent", agent.clone());
        self.remember(&mut state, assistant_turn).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        state.record("total_duration_ms", duration_ms);
        self.events.publish(DomainEvent::ReplyGenerated {
            session_id: state.session_id.clone(),
            agent: agent.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        info!(
            session_id = %state.session_id,
            intent = state.intent_label(),
            agent = %agent,
            duration_ms,
            reply_len = reply.len(),
            "Pipeline finished"
        );

        Ok(ChatOutput {
            intent: state.intent_label().to_string(),
            session_id: state.session_id,
            reply,
            agent,
            timestamp_ms: Utc::now().timestamp_millis(),
            metadata: state.metadata,
        })
    }

    // ── Stages ─────────────────────────────────────────────────────────

    async fn recognize(&self, state: &mut PipelineState) {
        let started = Instant::now();
        let classification = self.classifier.recognize(&state.original_message).await;

        state.record(
            "intent_recognition_duration_ms",
            started.elapsed().as_millis() as u64,
        );
        state.record("intent_source", classification.source.as_str());
        state.record("intent_confidence", classification.intent.confidence as f64);
        if let Some(e) = &classification.fallback {
            state.record("intent_fallback_reason", e.to_string());
            self.degraded(state, "intent", &e.to_string());
        }

        self.events.publish(DomainEvent::IntentRecognized {
            session_id: state.session_id.clone(),
            intent: classification.intent.kind.as_str().to_string(),
            confidence: classification.intent.confidence,
            timestamp: Utc::now(),
        });
        debug!(
            session_id = %state.session_id,
            intent = %classification.intent.kind,
            confidence = classification.intent.confidence,
            source = classification.source.as_str(),
            "Intent recognized"
        );
        state.intent = Some(classification.intent);
    }

    /// Use the identifier in this message, or the one the session last
    /// mentioned.
    async fn resolve_identifier(&self, state: &mut PipelineState) {
        let working = self.memory.working();
        if let Some(id) = extract_identifier(&state.original_message) {
            working
                .set(&state.session_id, ACTIVE_IDENTIFIER_KEY, serde_json::Value::String(id.clone()))
                .await;
            state.record("identifier_source", "utterance");
            state.identifier = Some(id);
            return;
        }

        if let Some(serde_json::Value::String(id)) =
            working.get(&state.session_id, ACTIVE_IDENTIFIER_KEY).await
        {
            debug!(session_id = %state.session_id, identifier = %id, "Reusing active identifier");
            state.record("identifier_source", "working_memory");
            state.identifier = Some(id);
        }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        state: &mut PipelineState,
        user_turn_id: &str,
        deadline: tokio::time::Instant,
    ) -> Result<(), Error> {
        match stage {
            Stage::ToolSelection => {
                match self.selector.select_tools(state).await {
                    Ok(selections) => state.selected_tools = selections,
                    Err(e) => {
                        state.record("tool_selection_error", e.to_string());
                        self.degraded(state, stage.as_str(), &e.to_string());
                    }
                }
                state.record("selected_tools_count", state.selected_tools.len());
            }

            Stage::ToolExecution => {
                if state.selected_tools.is_empty() {
                    state.record("tool_execution_skipped", true);
                    return Ok(());
                }
                state.tool_results = self.executor.execute(&state.selected_tools).await;
                let failures = state.tool_results.iter().filter(|r| !r.is_success()).count();
                state.record("tool_execution_count", state.tool_results.len());
                state.record("tool_execution_failures", failures);
            }

            Stage::Synthesis => {
                let (context, in_context) = self.build_context(state, user_turn_id).await;
                match state.branch {
                    Some(Branch::ToolAugmented) => {
                        let budget = self.synthesis_budget(deadline);
                        let synthesis = self
                            .synthesizer
                            .synthesize_tool_augmented(state, context, budget)
                            .await;
                        if let Some(e) = &synthesis.fallback {
                            state.record("synthesis_fallback", true);
                            state.record("synthesis_error", e.to_string());
                            self.degraded(state, stage.as_str(), &e.to_string());
                        }
                        state.analysis_result = Some(synthesis.reply.clone());
                        state.final_reply = Some(synthesis.reply);
                    }
                    Some(Branch::Knowledge) => {
                        let knowledge = self.knowledge(state, &in_context).await;
                        let documents = self.reference_documents(state).await;
                        let reply = self
                            .direct_reply(state, context, &knowledge, &documents, deadline)
                            .await?;
                        state.final_reply = Some(reply);
                    }
                    _ => {
                        let reply = self.direct_reply(state, context, &[], &[], deadline).await?;
                        state.final_reply = Some(reply);
                    }
                }
            }
        }
        Ok(())
    }

    async fn direct_reply(
        &self,
        state: &PipelineState,
        context: Vec<Message>,
        knowledge: &[Memory],
        documents: &[DocumentHit],
        deadline: tokio::time::Instant,
    ) -> Result<String, Error> {
        let budget = self.synthesis_budget(deadline);
        match self
            .synthesizer
            .synthesize_direct(context, knowledge, documents, budget)
            .await
        {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.degraded(state, Stage::Synthesis.as_str(), &e.to_string());
                Err(e)
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    /// Time left for the model before the request deadline, keeping back
    /// what the assistant-turn writes may need.
    fn synthesis_budget(&self, deadline: tokio::time::Instant) -> Duration {
        deadline
            .saturating_duration_since(tokio::time::Instant::now())
            .saturating_sub(self.settings.memory_reserve)
    }

    /// Replay recent turns plus the current message into a bounded context.
    /// Also returns the ids of the turns that made it in.
    async fn build_context(
        &self,
        state: &mut PipelineState,
        user_turn_id: &str,
    ) -> (Vec<Message>, HashSet<String>) {
        let turns: Vec<Memory> = self
            .memory
            .session_history(&state.session_id, self.settings.history_turns + 1)
            .await
            .into_iter()
            .filter(|m| m.id != user_turn_id)
            .collect();
        let skip = turns.len().saturating_sub(self.settings.history_turns);

        let mut builder = ContextBuilder::new(self.settings.context_max_tokens);
        let mut in_context = HashSet::new();
        in_context.insert(user_turn_id.to_string());
        for turn in turns.into_iter().skip(skip) {
            let role = turn.role.unwrap_or(Role::User);
            if builder.add_message(role, turn.content) {
                in_context.insert(turn.id);
            }
        }

        let fitted = builder.add_message(Role::User, state.original_message.clone());
        let mut messages = builder.to_messages();
        if !fitted {
            messages.push(Message::user(state.original_message.clone()));
            state.record("context_overflow", true);
        }
        state.record("context_tokens", builder.total_tokens());
        if builder.compressions() > 0 {
            state.record("context_compressions", builder.compressions());
        }
        (messages, in_context)
    }

    /// Memories relevant to the message that are not already in context.
    async fn knowledge(&self, state: &mut PipelineState, in_context: &HashSet<String>) -> Vec<Memory> {
        let recall = self
            .memory
            .retrieve(&state.original_message, &state.session_id, self.settings.retrieval_top_k)
            .await;
        if let Some(e) = &recall.long_term_error {
            state.record("memory_error", e.to_string());
        }
        let found: Vec<Memory> = recall
            .memories
            .into_iter()
            .filter(|m| m.kind != MemoryKind::Working && !in_context.contains(&m.id))
            .collect();
        state.record("retrieved_memories_count", found.len());
        found
    }

    /// Documents from the knowledge base closest to the message.
    async fn reference_documents(&self, state: &mut PipelineState) -> Vec<DocumentHit> {
        let Some(documents) = &self.documents else {
            return Vec::new();
        };
        match documents
            .search(&state.original_message, self.settings.retrieval_top_k)
            .await
        {
            Ok(hits) => {
                state.record("retrieved_documents_count", hits.len());
                hits
            }
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "Document search failed");
                state.record("document_error", e.to_string());
                Vec::new()
            }
        }
    }

    async fn remember(&self, state: &mut PipelineState, memory: Memory) {
        let kind = memory.kind;
        match self.memory.store(memory).await {
            Ok(id) => {
                self.events.publish(DomainEvent::MemoryStored {
                    session_id: state.session_id.clone(),
                    memory_id: id,
                    kind: kind.as_str().to_string(),
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "Failed to persist memory");
                state.record("memory_error", e.to_string());
            }
        }
    }

    fn degraded(&self, state: &PipelineState, stage: &str, reason: &str) {
        warn!(session_id = %state.session_id, stage, reason, "Stage degraded");
        self.events.publish(DomainEvent::StageDegraded {
            session_id: state.session_id.clone(),
            stage: stage.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }
}

fn agent_name(state: &PipelineState) -> String {
    match state.branch {
        Some(Branch::ToolAugmented) => state.intent_label().to_string(),
        Some(Branch::Knowledge) => "knowledge".to_string(),
        _ => "general_chat".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::SERVICE_UNAVAILABLE_REPLY;
    use crate::test_helpers::{
        EchoProvider, FailingProvider, HangingEmbedder, HangingProvider, ScriptedProvider,
        StaticTools, document_store, memory_manager, memory_manager_with, video_envelope,
        video_info_descriptor,
    };

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.pipeline.intent_timeout_secs = 1;
        config.pipeline.selection_timeout_secs = 1;
        config.pipeline.synthesis_timeout_secs = 1;
        config.pipeline.chat_timeout_secs = 1;
        config.pipeline.tool_call_timeout_secs = 1;
        config.pipeline.request_timeout_secs = 30;
        config
    }

    fn video_tools() -> Arc<StaticTools> {
        Arc::new(StaticTools::new(vec![video_info_descriptor()]).with_result("video_info", Ok(video_envelope(12345))))
    }

    fn orchestrator(provider: Arc<dyn Provider>, tools: Arc<StaticTools>) -> Orchestrator {
        Orchestrator::new(provider, memory_manager(), Arc::new(ToolCatalog::new(tools)), &config())
    }

    fn input(session: Option<&str>, message: &str) -> ChatInput {
        ChatInput {
            session_id: session.map(String::from),
            user_id: "u1".into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn video_analysis_end_to_end() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"video_analysis","confidence":0.95,"entities":[]}"#,
            r#"{"tools":[{"name":"video_info","params":{"参数值":"BV1234567890"},"reason":"stats","confidence":0.9}]}"#,
            "[Summary] A quick Rust tour with 12345 views",
        ]));
        let tools = video_tools();
        let orch = orchestrator(provider.clone(), tools.clone());

        let out = orch.execute(input(Some("s1"), "分析视频 BV1234567890")).await.unwrap();

        assert_eq!(out.session_id, "s1");
        assert_eq!(out.intent, "video_analysis");
        assert_eq!(out.agent, "video_analysis");
        assert_eq!(out.reply, "[Summary] A quick Rust tour with 12345 views");
        assert_eq!(out.metadata["branch"], "tool_augmented");
        assert_eq!(out.metadata["selected_tools_count"], 1);
        assert_eq!(out.metadata["tool_execution_count"], 1);
        assert!(out.metadata.contains_key("synthesis_duration_ms"));

        let calls = tools.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "video_info");
        assert_eq!(calls[0].1, serde_json::json!({ "bvid": "BV1234567890" }));

        let requests = provider.requests();
        let synthesis_prompt = &requests[2].messages.last().unwrap().content;
        assert!(synthesis_prompt.contains("views 12345"));
    }

    #[tokio::test]
    async fn both_turns_are_remembered_and_grounded_reply_is_promoted() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"video_analysis","confidence":0.95}"#,
            r#"{"tools":[{"name":"video_info","params":{}}]}"#,
            "report",
        ]));
        let orch = orchestrator(provider, video_tools());
        orch.execute(input(Some("s1"), "分析视频 BV1234567890")).await.unwrap();

        let history = orch.history("s1", 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Some(Role::User));
        assert_eq!(history[1].role, Some(Role::Assistant));
        assert_eq!(history[1].metadata["agent"], "video_analysis");

        let long_term = orch.memory().long_term().unwrap();
        let promoted = long_term.get(&history[1].id).await.unwrap();
        assert!(promoted.is_some());
        assert!(long_term.get(&history[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn follow_up_reuses_active_identifier() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"video_analysis","confidence":0.95}"#,
            r#"{"tools":[{"name":"video_info","params":{}}]}"#,
            "first report",
            r#"{"type":"danmaku_analysis","confidence":0.9}"#,
            r#"{"tools":[{"name":"video_info","params":{}}]}"#,
            "second report",
        ]));
        let tools = video_tools();
        let orch = orchestrator(provider, tools.clone());

        orch.execute(input(Some("s1"), "分析视频 BV1234567890")).await.unwrap();
        let out = orch.execute(input(Some("s1"), "观众反馈如何")).await.unwrap();

        assert_eq!(out.metadata["identifier_source"], "working_memory");
        let calls = tools.invocations();
        assert_eq!(calls[1].1["bvid"], "BV1234567890");
    }

    #[tokio::test]
    async fn general_chat_skips_tools() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"general_chat","confidence":0.99}"#,
            "Hello! How can I help?",
        ]));
        let tools = video_tools();
        let orch = orchestrator(provider, tools.clone());

        let out = orch.execute(input(None, "你好")).await.unwrap();
        assert_eq!(out.agent, "general_chat");
        assert_eq!(out.reply, "Hello! How can I help?");
        assert_eq!(out.metadata["tool_selection_skipped"], true);
        assert!(!out.session_id.is_empty());
        assert!(tools.invocations().is_empty());
    }

    #[tokio::test]
    async fn tool_selection_failure_still_replies() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"video_analysis","confidence":0.95}"#,
            "report without data",
        ]));
        let orch = orchestrator(provider, Arc::new(StaticTools::unreachable()));
        let mut events = orch.events().subscribe();

        let out = orch.execute(input(Some("s1"), "分析视频 BV1234567890")).await.unwrap();
        assert!(out.metadata["tool_selection_error"].as_str().unwrap().contains("no tools available"));
        assert_eq!(out.metadata["selected_tools_count"], 0);
        assert_eq!(out.metadata["tool_execution_skipped"], true);
        assert_eq!(out.reply, "report without data");

        let mut saw_degraded = false;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::StageDegraded { stage, .. } = event.as_ref() {
                saw_degraded |= stage == "tool_selection";
            }
        }
        assert!(saw_degraded);
    }

    #[tokio::test]
    async fn model_outage_on_tool_branch_uses_template() {
        let orch = orchestrator(Arc::new(FailingProvider), video_tools());
        let out = orch.execute(input(Some("s1"), "分析视频 BV1234567890")).await.unwrap();

        // Rules classify it; selection fails; the template carries the reply.
        assert_eq!(out.intent, "video_analysis");
        assert_eq!(out.metadata["intent_source"], "rules");
        assert_eq!(out.metadata["synthesis_fallback"], true);
        assert!(out.reply.starts_with("Analysis report"));
    }

    #[tokio::test]
    async fn model_outage_on_direct_branch_is_service_unavailable() {
        let orch = orchestrator(Arc::new(FailingProvider), video_tools());
        let err = orch.execute(input(Some("s1"), "hello")).await.unwrap_err();
        match err {
            Error::ServiceUnavailable { reply, .. } => assert_eq!(reply, SERVICE_UNAVAILABLE_REPLY),
            other => panic!("Expected ServiceUnavailable, got: {other:?}"),
        }

        // The user turn was kept; no assistant turn was written.
        let history = orch.history("s1", 10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Some(Role::User));
    }

    #[tokio::test]
    async fn knowledge_branch_uses_long_term_memory() {
        let memory = memory_manager();
        memory
            .long_term()
            .unwrap()
            .store(
                Memory::new("s1", MemoryKind::LongTerm, "the user's channel is about rust programming")
                    .with_importance(0.9),
            )
            .await
            .unwrap();

        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"knowledge_qa","confidence":0.9}"#,
            "Rust is a systems language.",
        ]));
        let orch = Orchestrator::new(
            provider.clone(),
            memory,
            Arc::new(ToolCatalog::new(video_tools())),
            &config(),
        );

        let out = orch.execute(input(Some("s1"), "what is rust")).await.unwrap();
        assert_eq!(out.agent, "knowledge");
        assert!(out.metadata["retrieved_memories_count"].as_u64().unwrap() >= 1);
        let system = &provider.requests()[1].messages[0].content;
        assert!(system.contains("channel is about rust"));
    }

    #[tokio::test]
    async fn knowledge_branch_cites_reference_documents() {
        let documents = document_store();
        documents
            .add("cooking videos do best on weekend mornings", serde_json::Map::new())
            .await
            .unwrap();

        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"knowledge_qa","confidence":0.9}"#,
            "Weekend mornings.",
        ]));
        let orch = orchestrator(provider.clone(), video_tools()).with_documents(documents);

        let out = orch
            .execute(input(Some("s1"), "when should I post cooking videos"))
            .await
            .unwrap();
        assert_eq!(out.reply, "Weekend mornings.");
        assert_eq!(out.metadata["retrieved_documents_count"], 1);
        let system = &provider.requests()[1].messages[0].content;
        assert!(system.contains("Reference documents"));
        assert!(system.contains("cooking videos do best on weekend mornings"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_embedder_does_not_sink_knowledge_turn() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"knowledge_qa","confidence":0.9}"#,
            "Rust is a systems language.",
        ]));
        let orch = Orchestrator::new(
            provider,
            memory_manager_with(Arc::new(HangingEmbedder)),
            Arc::new(ToolCatalog::new(video_tools())),
            &AppConfig::default(),
        );

        let out = orch.execute(input(Some("s1"), "what is rust")).await.unwrap();
        assert_eq!(out.reply, "Rust is a systems language.");
        assert!(out.metadata["memory_error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_embedder_does_not_drop_grounded_reply() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"video_analysis","confidence":0.95}"#,
            r#"{"tools":[{"name":"video_info","params":{}}]}"#,
            "report",
        ]));
        let orch = Orchestrator::new(
            provider,
            memory_manager_with(Arc::new(HangingEmbedder)),
            Arc::new(ToolCatalog::new(video_tools())),
            &AppConfig::default(),
        );

        let out = orch.execute(input(Some("s1"), "分析视频 BV1234567890")).await.unwrap();
        assert_eq!(out.reply, "report");
        assert!(out.metadata["memory_error"].as_str().unwrap().contains("timed out"));
        assert_eq!(orch.history("s1", 10).await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_model_with_default_budget_falls_back_to_template() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        let orch = Orchestrator::new(
            Arc::new(HangingProvider),
            memory_manager(),
            Arc::new(ToolCatalog::new(video_tools())),
            &config,
        );

        let out = orch.execute(input(Some("s1"), "分析视频 BV1234567890")).await.unwrap();
        assert_eq!(out.intent, "video_analysis");
        assert_eq!(out.metadata["synthesis_fallback"], true);
        assert!(out.reply.starts_with("Analysis report (simplified)"));
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_is_cut_short_to_meet_the_deadline() {
        let mut config = config();
        config.pipeline.request_timeout_secs = 20;
        config.pipeline.intent_timeout_secs = 8;
        config.pipeline.selection_timeout_secs = 8;
        config.pipeline.synthesis_timeout_secs = 15;
        let orch = Orchestrator::new(
            Arc::new(HangingProvider),
            memory_manager(),
            Arc::new(ToolCatalog::new(video_tools())),
            &config,
        );

        let out = orch.execute(input(Some("s1"), "分析视频 BV1234567890")).await.unwrap();
        assert_eq!(out.metadata["synthesis_fallback"], true);
        assert!(out.reply.starts_with("Analysis report (simplified)"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_turns_on_one_session_all_land() {
        let orch = Arc::new(orchestrator(Arc::new(EchoProvider), video_tools()));
        let mut turns = tokio::task::JoinSet::new();
        for i in 0..8 {
            let orch = orch.clone();
            turns.spawn(async move {
                orch.execute(input(Some("shared"), &format!("message {i} BV123456789{i}")))
                    .await
            });
        }
        while let Some(joined) = turns.join_next().await {
            let out = joined.unwrap().unwrap();
            assert_eq!(out.session_id, "shared");
            assert!(out.reply.starts_with("re: message"));
        }

        let history = orch.history("shared", 100).await;
        assert_eq!(history.len(), 16);
        for i in 0..8 {
            let message = format!("message {i} BV123456789{i}");
            assert!(history.iter().any(|m| m.role == Some(Role::User) && m.content == message));
            let reply = format!("re: {message}");
            assert!(history.iter().any(|m| m.role == Some(Role::Assistant) && m.content == reply));
        }

        // 16 writes at a threshold of 10 produce exactly one digest.
        let stored = orch.memory().long_term().unwrap().by_session("shared").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, MemoryKind::Compressed);

        let working = orch.memory().working().get_all("shared").await;
        assert_eq!(working.len(), 1);
        let active = orch.memory().working().get("shared", ACTIVE_IDENTIFIER_KEY).await.unwrap();
        assert!(active.as_str().unwrap().starts_with("BV123456789"));
    }

    #[tokio::test]
    async fn history_is_replayed_into_context() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"general_chat","confidence":0.99}"#,
            "Nice to meet you, Ada.",
            r#"{"type":"general_chat","confidence":0.99}"#,
            "Your name is Ada.",
        ]));
        let orch = orchestrator(provider.clone(), video_tools());

        orch.execute(input(Some("s1"), "my name is Ada")).await.unwrap();
        orch.execute(input(Some("s1"), "what's my name?")).await.unwrap();

        let chat = &provider.requests()[3].messages;
        let contents: Vec<&str> = chat.iter().skip(1).map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["my name is Ada", "Nice to meet you, Ada.", "what's my name?"]);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let orch = orchestrator(Arc::new(FailingProvider), video_tools());
        assert!(matches!(
            orch.execute(input(None, "   ")).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn request_deadline_cancels_the_turn() {
        let mut config = config();
        config.pipeline.request_timeout_secs = 1;
        config.pipeline.intent_timeout_secs = 5;
        config.pipeline.chat_timeout_secs = 5;
        let orch = Orchestrator::new(
            Arc::new(HangingProvider),
            memory_manager(),
            Arc::new(ToolCatalog::new(video_tools())),
            &config,
        );

        let err = orch.execute(input(Some("s1"), "hello")).await.unwrap_err();
        assert!(matches!(err, Error::RequestTimeout { timeout_secs: 1 }));
    }

    #[tokio::test]
    async fn clear_session_drops_history_and_identifier() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"type":"general_chat","confidence":0.99}"#,
            "ok",
        ]));
        let orch = orchestrator(provider, video_tools());
        orch.execute(input(Some("s1"), "remember BV1234567890")).await.unwrap();
        assert!(orch.memory().working().get("s1", ACTIVE_IDENTIFIER_KEY).await.is_some());

        orch.clear_session("s1").await;
        assert!(orch.history("s1", 10).await.is_empty());
        assert!(orch.memory().working().get("s1", ACTIVE_IDENTIFIER_KEY).await.is_none());
    }

    #[test]
    fn plans_are_fixed_per_branch() {
        assert_eq!(plan(Branch::ToolAugmented).len(), 3);
        assert_eq!(plan(Branch::GeneralChat), &[Stage::Synthesis]);
        assert_eq!(plan(Branch::Knowledge), &[Stage::Synthesis]);
    }
}
