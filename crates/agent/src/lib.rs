//! The Vireo request pipeline.
//!
//! A user message moves through a fixed sequence of stages:
//!
//! 1. **Classify** the utterance (model first, keyword rules as fallback)
//! 2. **Route** the intent to a branch
//! 3. **Select tools** for tool-augmented branches
//! 4. **Execute** the selected tools, isolating failures per call
//! 5. **Synthesize** a reply from the tool data or the conversation
//!
//! Each stage has its own deadline and a degraded path, so a failing model
//! or tool endpoint shortens the answer instead of failing the turn. The
//! one exception is a direct (non-tool) reply with no model available,
//! which surfaces as [`vireo_core::Error::ServiceUnavailable`].

pub mod context;
pub mod executor;
pub mod extract;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod router;
pub mod selector;
pub mod state;
pub mod synthesizer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextBuilder, ContextMessage};
pub use executor::{ToolExecutionResult, ToolExecutor};
pub use extract::{ExtractedFields, extract_fields};
pub use intent::{Classification, IntentClassifier, IntentSource};
pub use llm::ModelClient;
pub use orchestrator::{ChatInput, ChatOutput, Orchestrator};
pub use router::{Branch, route};
pub use selector::{ToolSelection, ToolSelector};
pub use state::PipelineState;
pub use synthesizer::{ResponseSynthesizer, SERVICE_UNAVAILABLE_REPLY, Synthesis};
