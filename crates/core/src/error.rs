//! Error types for the Vireo domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant; pipeline stages report
//! their degraded paths through [`StageError`].

use thiserror::Error;

/// The top-level error type for all Vireo operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Pipeline stage errors ---
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The language model was unreachable on a turn that has no other way
    /// to produce a reply.
    #[error("Service unavailable: {reason}")]
    ServiceUnavailable { reason: String, reply: String },

    #[error("Request timed out after {timeout_secs}s")]
    RequestTimeout { timeout_secs: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Working memory cannot be written to the {0} tier")]
    WrongTier(String),

    #[error("Memory {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// The remote tool endpoint was unreachable or answered with a malformed
    /// envelope.
    #[error("Tool protocol error: {0}")]
    Protocol(String),
}

/// Failures of individual pipeline stages. None of these abort a turn; the
/// orchestrator records them in the output metadata and takes the stage's
/// fallback path.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("Intent classification failed: {0}")]
    Classification(String),

    #[error("Tool selection failed: {0}")]
    ToolSelection(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Stage '{stage}' timed out after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::ExecutionFailed {
            tool_name: "video_info".into(),
            reason: "upstream returned 502".into(),
        });
        assert!(err.to_string().contains("video_info"));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn stage_timeout_names_the_stage() {
        let err: Error = StageError::Timeout {
            stage: "intent".into(),
            timeout_ms: 10_000,
        }
        .into();
        assert!(err.to_string().contains("intent"));
        assert!(err.to_string().contains("10000ms"));
    }
}
