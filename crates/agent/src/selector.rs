//! Tool selection.
//!
//! The model picks tools from the catalog and fills in their parameters.
//! Its picks are then repaired against the catalog: unknown tools are
//! dropped, generic parameter names are moved onto the schema's real keys,
//! and a missing identifier parameter is filled from the utterance.

use crate::intent::extract_identifier;
use crate::llm::{ModelClient, json_object_span};
use crate::state::PipelineState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vireo_core::error::StageError;
use vireo_core::message::Message;
use vireo_core::tool::ToolDescriptor;
use vireo_tools::ToolCatalog;

/// Parameter names models use when they don't know the real one.
const PLACEHOLDER_KEYS: &[&str] = &[
    "参数名", "参数值", "param", "params", "parameter", "value", "arg", "argument", "key", "input",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSelection {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct SelectionReply {
    #[serde(default)]
    tools: Vec<RawSelection>,
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    name: String,
    #[serde(default)]
    params: serde_json::Value,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct ToolSelector {
    llm: ModelClient,
    catalog: Arc<ToolCatalog>,
    timeout: Duration,
}

impl ToolSelector {
    pub fn new(llm: ModelClient, catalog: Arc<ToolCatalog>, timeout: Duration) -> Self {
        Self {
            llm,
            catalog,
            timeout,
        }
    }

    pub async fn select_tools(&self, state: &PipelineState) -> Result<Vec<ToolSelection>, StageError> {
        let tools = self
            .catalog
            .tools()
            .await
            .map_err(|e| StageError::ToolSelection(format!("no tools available: {e}")))?;
        if tools.is_empty() {
            return Err(StageError::ToolSelection("no tools available".into()));
        }

        let messages = vec![Message::user(selection_prompt(state, &tools))];
        let reply = self
            .llm
            .complete("tool_selection", messages, self.timeout)
            .await
            .map_err(|e| e.into_stage("tool_selection", StageError::ToolSelection))?;

        let selections = parse_selections(&reply, &tools, state.identifier.as_deref())?;
        debug!(
            session_id = %state.session_id,
            selected = selections.len(),
            "Tools selected"
        );
        Ok(selections)
    }
}

fn selection_prompt(state: &PipelineState, tools: &[ToolDescriptor]) -> String {
    let mut listing = String::new();
    for (i, tool) in tools.iter().enumerate() {
        let mut keys = tool.parameter_keys();
        keys.sort();
        let required = tool.required_keys();
        listing.push_str(&format!(
            "{}. {} - {} (parameters: {}; required: {})\n",
            i + 1,
            tool.name,
            tool.description,
            if keys.is_empty() { "none".to_string() } else { keys.join(", ") },
            if required.is_empty() { "none".to_string() } else { required.join(", ") },
        ));
    }

    let identifier = state.identifier.as_deref().unwrap_or("none");
    format!(
        "Choose the tools needed to answer the user's request.\n\n\
         Intent: {intent}\n\
         Message: {message}\n\
         Video identifier: {identifier}\n\n\
         Available tools:\n{listing}\n\
         Reply with strict JSON:\n\
         {{\"tools\": [{{\"name\": \"<tool name>\", \"params\": {{\"<parameter name>\": \"<value>\"}}, \
         \"reason\": \"<why>\", \"confidence\": 0.9}}]}}\n\n\
         Rules:\n\
         1. name must be one of the available tools\n\
         2. params keys must be the tool's real parameter names\n\
         3. if a video identifier is given ({identifier}), pass it to the tool\n\
         4. only choose tools that are actually needed",
        intent = state.intent_label(),
        message = state.original_message,
    )
}

/// Parse the model's reply and repair each pick against the catalog.
pub fn parse_selections(
    reply: &str,
    tools: &[ToolDescriptor],
    identifier: Option<&str>,
) -> Result<Vec<ToolSelection>, StageError> {
    let span = json_object_span(reply)
        .ok_or_else(|| StageError::ToolSelection("reply contained no JSON object".into()))?;
    let parsed: SelectionReply = serde_json::from_str(span)
        .map_err(|e| StageError::ToolSelection(format!("unparsable selection JSON: {e}")))?;

    let mut selections = Vec::with_capacity(parsed.tools.len());
    for raw in parsed.tools {
        let Some(descriptor) = tools.iter().find(|t| t.name == raw.name) else {
            warn!(tool = %raw.name, "Model selected a tool that is not in the catalog");
            continue;
        };

        let mut params = match raw.params {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        repair_params(&mut params, descriptor, identifier);

        selections.push(ToolSelection {
            name: raw.name,
            params,
            reason: raw.reason.unwrap_or_default(),
            confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        });
    }
    Ok(selections)
}

/// Align `params` with the tool's schema.
///
/// Keys the schema does not declare are moved onto a declared key that is
/// still missing (required keys first). Identifier-like keys only accept
/// values that look like an identifier. Placeholder keys with nowhere to go
/// are dropped; other unknown keys are left alone. Finally an empty
/// identifier-like key is filled from `identifier`.
pub fn repair_params(
    params: &mut serde_json::Map<String, serde_json::Value>,
    descriptor: &ToolDescriptor,
    identifier: Option<&str>,
) {
    let mut known = descriptor.parameter_keys();
    if known.is_empty() {
        return;
    }
    known.sort();
    let required = descriptor.required_keys();

    let unknown: Vec<String> = params
        .keys()
        .filter(|k| !known.contains(*k))
        .cloned()
        .collect();

    for key in unknown {
        let Some(value) = params.remove(&key) else {
            continue;
        };
        let missing = missing_keys(params, &required, &known);
        let target = if looks_like_identifier(&value, identifier) {
            missing
                .iter()
                .find(|k| is_identifier_key(k))
                .or_else(|| missing.first())
        } else {
            missing.iter().find(|k| !is_identifier_key(k))
        };

        match target {
            Some(target) => {
                debug!(tool = %descriptor.name, from = %key, to = %target, "Remapped tool parameter");
                params.insert(target.clone(), value);
            }
            None if is_placeholder(&key) => {
                debug!(tool = %descriptor.name, key = %key, "Dropped placeholder parameter");
            }
            None => {
                params.insert(key, value);
            }
        }
    }

    if let Some(identifier) = identifier {
        let slot = known.iter().filter(|k| is_identifier_key(k)).find(|k| {
            params
                .get(k.as_str())
                .is_none_or(|v| v.is_null() || v.as_str() == Some(""))
        });
        // Only fill when no identifier-like key already carries a value.
        let already_set = known.iter().any(|k| {
            is_identifier_key(k)
                && params
                    .get(k.as_str())
                    .is_some_and(|v| !v.is_null() && v.as_str() != Some(""))
        });
        if let (Some(slot), false) = (slot, already_set) {
            params.insert(slot.clone(), serde_json::Value::String(identifier.to_string()));
        }
    }
}

/// Declared keys absent from `params`, required ones first.
fn missing_keys(
    params: &serde_json::Map<String, serde_json::Value>,
    required: &[String],
    known: &[String],
) -> Vec<String> {
    let mut missing: Vec<String> = required
        .iter()
        .filter(|k| known.contains(*k) && !params.contains_key(k.as_str()))
        .cloned()
        .collect();
    for key in known {
        if !params.contains_key(key.as_str()) && !missing.contains(key) {
            missing.push(key.clone());
        }
    }
    missing
}

/// The hint itself, or a value that is an identifier on its own.
fn looks_like_identifier(value: &serde_json::Value, identifier: Option<&str>) -> bool {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return false,
    };
    identifier == Some(text.as_str())
        || extract_identifier(&text).is_some_and(|id| id.eq_ignore_ascii_case(&text))
}

fn is_placeholder(key: &str) -> bool {
    PLACEHOLDER_KEYS.contains(&key.to_lowercase().as_str())
}

fn is_identifier_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    matches!(key.as_str(), "bvid" | "bv_id" | "vid" | "aid" | "id" | "videoid")
        || key.ends_with("video_id")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, StaticTools, video_info_descriptor};
    use serde_json::json;
    use vireo_core::intent::{Intent, IntentKind};

    fn search_descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "video_search",
            "Search videos by keyword",
            json!({
                "type": "object",
                "properties": { "keyword": {}, "page": {} },
                "required": ["keyword"]
            }),
        )
    }

    fn state(message: &str, identifier: Option<&str>) -> PipelineState {
        let mut state = PipelineState::new("s", "u", message);
        state.intent = Some(Intent::new(IntentKind::VideoAnalysis, 0.9, message));
        state.identifier = identifier.map(String::from);
        state
    }

    #[test]
    fn placeholder_key_moves_to_schema_key() {
        let mut params = json!({ "参数值": "BV1234567890" }).as_object().unwrap().clone();
        repair_params(&mut params, &video_info_descriptor(), Some("BV1234567890"));
        assert_eq!(params, *json!({ "bvid": "BV1234567890" }).as_object().unwrap());
    }

    #[test]
    fn wrong_name_moves_to_required_key() {
        let mut params = json!({ "query": "rust", "page": 2 }).as_object().unwrap().clone();
        repair_params(&mut params, &search_descriptor(), None);
        assert_eq!(params["keyword"], "rust");
        assert_eq!(params["page"], 2);
        assert!(!params.contains_key("query"));
    }

    #[test]
    fn missing_identifier_is_filled_from_hint() {
        let mut params = serde_json::Map::new();
        repair_params(&mut params, &video_info_descriptor(), Some("BV1234567890"));
        assert_eq!(params["bvid"], "BV1234567890");
    }

    #[test]
    fn existing_identifier_is_kept() {
        let mut params = json!({ "bvid": "BV0987654321" }).as_object().unwrap().clone();
        repair_params(&mut params, &video_info_descriptor(), Some("BV1234567890"));
        assert_eq!(params["bvid"], "BV0987654321");
    }

    #[test]
    fn non_identifier_value_never_takes_identifier_slot() {
        let reply = r#"{"tools":[{"name":"video_info","params":{"query":"视频分析"}}]}"#;
        let selections =
            parse_selections(reply, &[video_info_descriptor()], Some("BV1234567890")).unwrap();
        assert_eq!(selections[0].params["bvid"], "BV1234567890");
        assert_ne!(selections[0].params["bvid"], "视频分析");
    }

    #[test]
    fn identifier_shaped_value_moves_without_hint() {
        let mut params = json!({ "video": "BV1234567890" }).as_object().unwrap().clone();
        repair_params(&mut params, &video_info_descriptor(), None);
        assert_eq!(params["bvid"], "BV1234567890");
        assert!(!params.contains_key("video"));
    }

    #[test]
    fn placeholder_without_target_is_dropped() {
        let mut params = json!({ "bvid": "BV1234567890", "value": "x", "extra": 1 })
            .as_object()
            .unwrap()
            .clone();
        repair_params(&mut params, &video_info_descriptor(), None);
        assert!(!params.contains_key("value"));
        assert_eq!(params["extra"], 1);
    }

    #[test]
    fn unknown_tools_are_dropped() {
        let reply = r#"Here you go:
            {"tools": [
                {"name": "video_info", "params": {"bvid": "BV1234567890"}, "reason": "stats", "confidence": 0.9},
                {"name": "teleport", "params": {}}
            ]}"#;
        let selections = parse_selections(reply, &[video_info_descriptor()], None).unwrap();
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].name, "video_info");
        assert_eq!(selections[0].reason, "stats");
    }

    #[test]
    fn null_params_become_empty() {
        let reply = r#"{"tools": [{"name": "video_search", "params": null}]}"#;
        let selections = parse_selections(reply, &[search_descriptor()], None).unwrap();
        assert!(selections[0].params.is_empty());
    }

    #[test]
    fn garbage_reply_is_a_selection_error() {
        assert!(matches!(
            parse_selections("no idea", &[video_info_descriptor()], None),
            Err(StageError::ToolSelection(_))
        ));
    }

    #[tokio::test]
    async fn selects_through_the_model() {
        let provider = Arc::new(ScriptedProvider::texts(&[
            r#"{"tools":[{"name":"video_info","params":{"参数值":"BV1234567890"},"reason":"need stats","confidence":0.95}]}"#,
        ]));
        let catalog = Arc::new(ToolCatalog::new(Arc::new(StaticTools::new(vec![video_info_descriptor()]))));
        let selector = ToolSelector::new(
            ModelClient::new(provider.clone(), "mock-model"),
            catalog,
            Duration::from_secs(1),
        );

        let selections = selector
            .select_tools(&state("分析视频 BV1234567890", Some("BV1234567890")))
            .await
            .unwrap();
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].params["bvid"], "BV1234567890");

        let prompt = &provider.last_request().unwrap().messages[0].content;
        assert!(prompt.contains("video_info"));
        assert!(prompt.contains("bvid"));
        assert!(prompt.contains("BV1234567890"));
    }

    #[tokio::test]
    async fn catalog_failure_is_a_selection_error() {
        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let catalog = Arc::new(ToolCatalog::new(Arc::new(StaticTools::unreachable())));
        let selector = ToolSelector::new(
            ModelClient::new(provider.clone(), "mock-model"),
            catalog,
            Duration::from_secs(1),
        );

        let err = selector.select_tools(&state("分析视频", None)).await.unwrap_err();
        assert!(err.to_string().contains("no tools available"));
        assert_eq!(provider.calls(), 0);
    }
}
