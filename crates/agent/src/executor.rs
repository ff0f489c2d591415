//! Tool execution.
//!
//! Every selection produces exactly one [`ToolExecutionResult`], in selection
//! order. A failed or timed-out call is recorded in its result and the rest
//! of the batch carries on.

use crate::selector::ToolSelection;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use vireo_core::error::ToolError;
use vireo_core::event::{DomainEvent, EventBus};
use vireo_tools::ToolCatalog;

#[derive(Debug, Clone, Serialize)]
pub struct ToolExecutionResult {
    pub tool_name: String,
    pub params: serde_json::Value,
    pub raw_result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ToolExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ToolExecutor {
    catalog: Arc<ToolCatalog>,
    call_timeout: Duration,
    max_parallel: usize,
    events: Option<Arc<EventBus>>,
}

impl ToolExecutor {
    pub fn new(catalog: Arc<ToolCatalog>, call_timeout: Duration) -> Self {
        Self {
            catalog,
            call_timeout,
            max_parallel: 1,
            events: None,
        }
    }

    /// Allow up to `n` calls in flight at once. Results keep selection order.
    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn execute(&self, selections: &[ToolSelection]) -> Vec<ToolExecutionResult> {
        let calls: Vec<_> = selections.iter().map(|s| self.run_one(s)).collect();
        futures::stream::iter(calls)
            .buffered(self.max_parallel)
            .collect()
            .await
    }

    async fn run_one(&self, selection: &ToolSelection) -> ToolExecutionResult {
        let params = serde_json::Value::Object(selection.params.clone());
        let started_at = Utc::now();
        let clock = Instant::now();

        let outcome = match tokio::time::timeout(
            self.call_timeout,
            self.catalog.invoke(&selection.name, params.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: selection.name.clone(),
                timeout_secs: self.call_timeout.as_secs(),
            }),
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        let (raw_result, error) = match outcome {
            Ok(value) => {
                info!(tool = %selection.name, duration_ms, "Tool call succeeded");
                (Some(value), None)
            }
            Err(e) => {
                warn!(tool = %selection.name, duration_ms, error = %e, "Tool call failed");
                (None, Some(e.to_string()))
            }
        };

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                tool_name: selection.name.clone(),
                success: error.is_none(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        ToolExecutionResult {
            tool_name: selection.name.clone(),
            params,
            raw_result,
            error,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        }
    }
}
