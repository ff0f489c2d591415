//! # Vireo Core
//!
//! Domain types, traits, and error definitions for the Vireo assistant
//! backend. This crate has no framework dependencies; it defines the model
//! every other crate implements against.
//!
//! ## Design
//!
//! Each external collaborator (language model, tool endpoint, vector index,
//! embedder) is a trait here. Implementations live in their own crates, and
//! tests swap in scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod memory;
pub mod intent;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result, StageError, ToolError};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use tool::{Tool, ToolDescriptor, ToolProtocol, ToolRegistry};
pub use memory::{Embedder, Memory, MemoryKind, MetadataStore, VectorHit, VectorStore};
pub use intent::{Entity, Intent, IntentKind};
pub use event::{DomainEvent, EventBus};
