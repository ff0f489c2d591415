//! Token-bounded context assembly.
//!
//! Conversation history is replayed into a [`ContextBuilder`] before every
//! model call that needs it. The builder keeps the total under budget by
//! folding older turns into a single summary message.

pub mod builder;
pub mod token;

pub use builder::{ContextBuilder, ContextMessage, KEEP_RECENT};
