//! Tool abstractions.
//!
//! Tools ground a reply in external data. The pipeline only ever talks to a
//! [`ToolProtocol`]: something that can list tools and invoke one by name with
//! a JSON parameter object. Remote endpoints implement it over the wire;
//! [`ToolRegistry`] implements it for in-process [`Tool`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::ToolError;

/// Catalog entry describing one invocable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters
    #[serde(default = "empty_schema", alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Property names declared by the schema.
    pub fn parameter_keys(&self) -> Vec<String> {
        self.input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Property names the schema marks as required.
    pub fn required_keys(&self) -> Vec<String> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The seam between the pipeline and whatever actually runs tools.
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// A short label for logs (e.g., "remote", "local").
    fn name(&self) -> &str;

    /// List the tools this endpoint offers.
    async fn discover(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError>;

    /// Invoke a tool and return its raw JSON result.
    async fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}

/// An in-process tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (shown to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<serde_json::Value, ToolError>;

    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// A registry of in-process tools, exposed through [`ToolProtocol`].
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for ToolRegistry {
    fn name(&self) -> &str {
        "local"
    }

    async fn discover(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.to_descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }

    async fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "repeat": { "type": "integer" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<serde_json::Value, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            Ok(serde_json::json!({ "echo": text }))
        }
    }

    #[test]
    fn descriptor_reads_schema_keys() {
        let descriptor = EchoTool.to_descriptor();
        let mut keys = descriptor.parameter_keys();
        keys.sort();
        assert_eq!(keys, vec!["repeat", "text"]);
        assert_eq!(descriptor.required_keys(), vec!["text"]);
    }

    #[test]
    fn descriptor_accepts_camel_case_schema() {
        let descriptor: ToolDescriptor = serde_json::from_value(serde_json::json!({
            "name": "video_info",
            "description": "Fetch video stats",
            "inputSchema": { "type": "object", "properties": { "bvid": {} } }
        }))
        .unwrap();
        assert_eq!(descriptor.parameter_keys(), vec!["bvid"]);
    }

    #[tokio::test]
    async fn registry_discover_and_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let tools = registry.discover().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let out = registry
            .invoke("echo", serde_json::json!({ "text": "hello" }))
            .await
            .unwrap();
        assert_eq!(out["echo"], "hello");
    }

    #[tokio::test]
    async fn registry_invoke_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("nonexistent", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
