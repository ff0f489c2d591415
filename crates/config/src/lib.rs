//! Configuration loading, validation, and management for Vireo.
//!
//! Loads configuration from `~/.vireo/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.vireo/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language-model endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Stage timeouts and pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Memory tier sizing
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Tool endpoint
    #[serde(default)]
    pub tools: ToolsConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

// ── Provider ──────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider label used in logs ("ollama", "openai", ...)
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Embedding model for the long-term tier. `None` disables it.
    #[serde(default = "default_embedding_model", skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Extra endpoints tried in order when the primary fails.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_urls: Vec<String>,
}

fn default_provider_name() -> String {
    "ollama".into()
}
fn default_api_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model() -> String {
    "qwen2.5:7b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_embedding_model() -> Option<String> {
    Some("nomic-embed-text".into())
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            embedding_model: default_embedding_model(),
            fallback_urls: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .field("fallback_urls", &self.fallback_urls)
            .finish()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for a whole turn
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_intent_timeout")]
    pub intent_timeout_secs: u64,

    #[serde(default = "default_selection_timeout")]
    pub selection_timeout_secs: u64,

    #[serde(default = "default_tool_call_timeout")]
    pub tool_call_timeout_secs: u64,

    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_secs: u64,

    #[serde(default = "default_chat_timeout")]
    pub chat_timeout_secs: u64,

    /// Model intents below this confidence are checked against the rules
    #[serde(default = "default_intent_threshold")]
    pub intent_threshold: f32,

    /// 1 = sequential tool execution
    #[serde(default = "default_max_parallel_tools")]
    pub max_parallel_tools: usize,

    #[serde(default = "default_context_max_tokens")]
    pub context_max_tokens: usize,

    /// Past turns pulled into the model context
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Memories retrieved for knowledge answers
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    /// Object name looked up when extracting tool payloads
    #[serde(default = "default_entity")]
    pub entity: String,
}

fn default_request_timeout() -> u64 {
    120
}
fn default_intent_timeout() -> u64 {
    10
}
fn default_selection_timeout() -> u64 {
    20
}
fn default_tool_call_timeout() -> u64 {
    20
}
fn default_synthesis_timeout() -> u64 {
    45
}
fn default_chat_timeout() -> u64 {
    30
}
fn default_intent_threshold() -> f32 {
    0.7
}
fn default_max_parallel_tools() -> usize {
    1
}
fn default_context_max_tokens() -> usize {
    4096
}
fn default_history_turns() -> usize {
    10
}
fn default_retrieval_top_k() -> usize {
    5
}
fn default_entity() -> String {
    "video".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            intent_timeout_secs: default_intent_timeout(),
            selection_timeout_secs: default_selection_timeout(),
            tool_call_timeout_secs: default_tool_call_timeout(),
            synthesis_timeout_secs: default_synthesis_timeout(),
            chat_timeout_secs: default_chat_timeout(),
            intent_threshold: default_intent_threshold(),
            max_parallel_tools: default_max_parallel_tools(),
            context_max_tokens: default_context_max_tokens(),
            history_turns: default_history_turns(),
            retrieval_top_k: default_retrieval_top_k(),
            entity: default_entity(),
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
    pub fn intent_timeout(&self) -> Duration {
        Duration::from_secs(self.intent_timeout_secs)
    }
    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.selection_timeout_secs)
    }
    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_call_timeout_secs)
    }
    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    /// Intent, selection, one tool call and synthesis back to back.
    pub fn tool_chain_secs(&self) -> u64 {
        self.intent_timeout_secs
            + self.selection_timeout_secs
            + self.tool_call_timeout_secs
            + self.synthesis_timeout_secs
    }

    /// Intent and chat back to back.
    pub fn direct_chain_secs(&self) -> u64 {
        self.intent_timeout_secs + self.chat_timeout_secs
    }

    fn stage_timeouts(&self) -> [(&'static str, u64); 5] {
        [
            ("intent_timeout_secs", self.intent_timeout_secs),
            ("selection_timeout_secs", self.selection_timeout_secs),
            ("tool_call_timeout_secs", self.tool_call_timeout_secs),
            ("synthesis_timeout_secs", self.synthesis_timeout_secs),
            ("chat_timeout_secs", self.chat_timeout_secs),
        ]
    }
}

// ── Memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_short_term_max_items")]
    pub short_term_max_items: usize,

    #[serde(default = "default_short_term_ttl")]
    pub short_term_ttl_secs: u64,

    #[serde(default = "default_working_max_size")]
    pub working_max_size: usize,

    /// Uncompressed short-term writes per session before a digest is made
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    #[serde(default = "default_true")]
    pub long_term_enabled: bool,

    /// Bound on one long-term or document store call, embedding included
    #[serde(default = "default_long_term_timeout")]
    pub long_term_timeout_secs: u64,
}

fn default_short_term_max_items() -> usize {
    100
}
fn default_short_term_ttl() -> u64 {
    24 * 60 * 60
}
fn default_working_max_size() -> usize {
    32
}
fn default_compression_threshold() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_long_term_timeout() -> u64 {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_max_items: default_short_term_max_items(),
            short_term_ttl_secs: default_short_term_ttl(),
            working_max_size: default_working_max_size(),
            compression_threshold: default_compression_threshold(),
            long_term_enabled: true,
            long_term_timeout_secs: default_long_term_timeout(),
        }
    }
}

impl MemoryConfig {
    pub fn short_term_ttl(&self) -> Duration {
        Duration::from_secs(self.short_term_ttl_secs)
    }
    pub fn long_term_timeout(&self) -> Duration {
        Duration::from_secs(self.long_term_timeout_secs)
    }

}

// ── Tools ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// JSON-RPC tool server base URL. Without one, only in-process tools exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// HTTP timeout for discovery requests
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
}

fn default_discovery_timeout() -> u64 {
    10
}

impl ToolsConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            discovery_timeout_secs: default_discovery_timeout(),
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.vireo/config.toml).
    ///
    /// Environment overrides:
    /// - `VIREO_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `VIREO_MODEL`
    /// - `VIREO_PROVIDER_URL`
    /// - `VIREO_TOOLS_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("VIREO_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("VIREO_MODEL") {
            config.provider.model = model;
        }

        if let Ok(url) = std::env::var("VIREO_PROVIDER_URL") {
            config.provider.api_url = url;
        }

        if let Ok(url) = std::env::var("VIREO_TOOLS_URL") {
            config.tools.endpoint = Some(url);
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".vireo")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let pipeline = &self.pipeline;
        if pipeline.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.request_timeout_secs must be > 0".into(),
            ));
        }
        for (name, secs) in pipeline.stage_timeouts() {
            if secs == 0 || secs >= pipeline.request_timeout_secs {
                return Err(ConfigError::ValidationError(format!(
                    "pipeline.{name} must be > 0 and shorter than request_timeout_secs ({})",
                    pipeline.request_timeout_secs
                )));
            }
        }

        if !(0.0..=1.0).contains(&pipeline.intent_threshold) {
            return Err(ConfigError::ValidationError(
                "pipeline.intent_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if pipeline.max_parallel_tools == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_parallel_tools must be >= 1".into(),
            ));
        }
        if pipeline.context_max_tokens < 64 {
            return Err(ConfigError::ValidationError(
                "pipeline.context_max_tokens must be >= 64".into(),
            ));
        }

        let memory = &self.memory;
        if memory.short_term_max_items == 0 || memory.working_max_size == 0 {
            return Err(ConfigError::ValidationError(
                "memory.short_term_max_items and memory.working_max_size must be > 0".into(),
            ));
        }
        if memory.compression_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "memory.compression_threshold must be > 0".into(),
            ));
        }
        if memory.long_term_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "memory.long_term_timeout_secs must be > 0".into(),
            ));
        }

        // The longest path through a turn must still leave room for its
        // fallback, so the deadline has to cover every stage back to back.
        let reserve = self.memory_reserve_secs();
        for (branch, chain) in [
            ("tool-augmented", pipeline.tool_chain_secs()),
            ("direct", pipeline.direct_chain_secs()),
        ] {
            if chain + reserve >= pipeline.request_timeout_secs {
                return Err(ConfigError::ValidationError(format!(
                    "{branch} stage timeouts ({chain}s) plus long-term memory ({reserve}s) \
                     must be shorter than pipeline.request_timeout_secs ({})",
                    pipeline.request_timeout_secs
                )));
            }
        }

        Ok(())
    }

    /// Whether the long-term tier can be wired (needs an embedding model).
    pub fn long_term_available(&self) -> bool {
        self.memory.long_term_enabled && self.provider.embedding_model.is_some()
    }

    /// Whether the document knowledge base can be wired.
    pub fn documents_available(&self) -> bool {
        self.provider.embedding_model.is_some()
    }

    /// Worst-case time one turn spends in embedding-backed stores: a digest
    /// on each of the two turn writes, the assistant promotion or the memory
    /// search, and the document search.
    pub fn memory_reserve_secs(&self) -> u64 {
        let mut calls = 0;
        if self.long_term_available() {
            calls += 3;
        }
        if self.documents_available() {
            calls += 1;
        }
        calls * self.memory.long_term_timeout_secs
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
