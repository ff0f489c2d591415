//! Per-request pipeline state.

use crate::executor::ToolExecutionResult;
use crate::router::Branch;
use crate::selector::ToolSelection;
use serde::Serialize;
use vireo_core::intent::Intent;

/// Everything one turn accumulates on its way through the stages.
///
/// Created when a message enters the pipeline, passed by `&mut` to each
/// stage, and dropped once the reply is returned.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub session_id: String,
    pub user_id: String,
    pub original_message: String,
    pub intent: Option<Intent>,
    pub branch: Option<Branch>,
    /// Video identifier from the utterance or the session's working memory.
    pub identifier: Option<String>,
    pub selected_tools: Vec<ToolSelection>,
    pub tool_results: Vec<ToolExecutionResult>,
    pub analysis_result: Option<String>,
    pub final_reply: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PipelineState {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            original_message: message.into(),
            intent: None,
            branch: None,
            identifier: None,
            selected_tools: Vec::new(),
            tool_results: Vec::new(),
            analysis_result: None,
            final_reply: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Record an output metadata entry.
    pub fn record(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn intent_label(&self) -> &'static str {
        self.intent
            .as_ref()
            .map(|i| i.kind.as_str())
            .unwrap_or("general_chat")
    }

    /// True when at least one tool call returned a result.
    pub fn has_tool_data(&self) -> bool {
        self.tool_results.iter().any(|r| r.is_success())
    }
}
