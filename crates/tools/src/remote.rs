//! Remote tool endpoint client.
//!
//! Speaks JSON-RPC 2.0 over plain HTTP POST: `tools/list` for discovery and
//! `tools/call` with `{name, arguments}` for invocation. Results come back
//! untouched; unwrapping payload envelopes is the synthesizer's job.

use crate::rpc::{CallToolParams, JsonRpcRequest, JsonRpcResponse, ListToolsResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use vireo_core::error::ToolError;
use vireo_core::tool::{ToolDescriptor, ToolProtocol};

/// JSON-RPC "method not found".
const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC "invalid params".
const INVALID_PARAMS: i64 = -32602;

pub struct RemoteToolClient {
    endpoint: String,
    client: reqwest::Client,
    discovery_timeout: Duration,
    call_timeout: Duration,
    next_id: AtomicU64,
}

impl RemoteToolClient {
    pub fn new(
        endpoint: impl Into<String>,
        discovery_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ToolError::Protocol(format!("HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            discovery_timeout,
            call_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, reqwest::Error> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        debug!(endpoint = %self.endpoint, method, id = request.id, "Sending tool request");

        self.client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<JsonRpcResponse>()
            .await
    }
}

#[async_trait]
impl ToolProtocol for RemoteToolClient {
    fn name(&self) -> &str {
        "remote"
    }

    async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let response = self
            .send("tools/list", None, self.discovery_timeout)
            .await
            .map_err(|e| ToolError::Protocol(format!("tools/list: {e}")))?;

        if let Some(err) = response.error {
            return Err(ToolError::Protocol(format!(
                "tools/list failed: {} (code={})",
                err.message, err.code
            )));
        }

        let result = response
            .result
            .ok_or_else(|| ToolError::Protocol("tools/list returned no result".into()))?;
        let listed: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ToolError::Protocol(format!("tools/list result: {e}")))?;

        debug!(endpoint = %self.endpoint, count = listed.tools.len(), "Discovered remote tools");
        Ok(listed.tools)
    }

    async fn invoke(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let call = CallToolParams {
            name: name.to_string(),
            arguments: params,
        };
        let call = serde_json::to_value(&call).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let response = self
            .send("tools/call", Some(call), self.call_timeout)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: name.to_string(),
                        timeout_secs: self.call_timeout.as_secs(),
                    }
                } else {
                    ToolError::ExecutionFailed {
                        tool_name: name.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if let Some(err) = response.error {
            warn!(tool = name, code = err.code, message = %err.message, "Remote tool returned an error");
            return Err(match err.code {
                METHOD_NOT_FOUND => ToolError::NotFound(name.to_string()),
                INVALID_PARAMS => ToolError::InvalidArguments(err.message),
                _ => ToolError::ExecutionFailed {
                    tool_name: name.to_string(),
                    reason: err.message,
                },
            });
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        if result.get("isError").and_then(|v| v.as_bool()) == Some(true) {
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: error_text(&result),
            });
        }
        Ok(result)
    }
}

/// First text block of a result flagged `isError`.
fn error_text(result: &serde_json::Value) -> String {
    result
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| blocks.iter().find_map(|b| b.get("text").and_then(|t| t.as_str())))
        .unwrap_or("tool reported an error")
        .to_string()
}
