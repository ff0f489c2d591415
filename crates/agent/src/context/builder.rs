//! Token-bounded conversation context.
//!
//! Messages are appended in order. When an append would exceed the budget,
//! everything except the newest [`KEEP_RECENT`] messages is folded into one
//! system summary and the total is recounted. If that still does not fit,
//! the append is rejected and the builder is left as it was.

use crate::context::token::estimate_tokens;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vireo_core::message::{Message, Role};

/// Messages kept verbatim when the context is compressed.
pub const KEEP_RECENT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
    pub token_estimate: usize,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            role,
            token_estimate: estimate_tokens(&content),
            content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_tokens: usize,
    messages: Vec<ContextMessage>,
    total_tokens: usize,
    compressions: usize,
}

impl ContextBuilder {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            messages: Vec::new(),
            total_tokens: 0,
            compressions: 0,
        }
    }

    /// Append a message. Returns `false` if it cannot fit even after
    /// compressing older messages.
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> bool {
        let message = ContextMessage::new(role, content);
        if self.total_tokens + message.token_estimate <= self.max_tokens {
            self.total_tokens += message.token_estimate;
            self.messages.push(message);
            return true;
        }

        let mut candidate = self.messages.clone();
        candidate.push(message);
        let Some(compressed) = compress(candidate) else {
            debug!(max_tokens = self.max_tokens, "Context message rejected, nothing to compress");
            return false;
        };

        let total: usize = compressed.iter().map(|m| m.token_estimate).sum();
        if total > self.max_tokens {
            debug!(total, max_tokens = self.max_tokens, "Context message rejected after compression");
            return false;
        }

        self.messages = compressed;
        self.total_tokens = total;
        self.compressions += 1;
        true
    }

    pub fn build(&self) -> Vec<ContextMessage> {
        self.messages.clone()
    }

    /// The built context as provider messages.
    pub fn to_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| Message::with_role(m.role, m.content.clone()))
            .collect()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// How many times older messages were folded into a summary.
    pub fn compressions(&self) -> usize {
        self.compressions
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Fold all but the newest `KEEP_RECENT` messages into a summary.
fn compress(messages: Vec<ContextMessage>) -> Option<Vec<ContextMessage>> {
    if messages.len() <= KEEP_RECENT {
        return None;
    }
    let split = messages.len() - KEEP_RECENT;
    let (older, recent) = messages.split_at(split);

    let mut out = Vec::with_capacity(KEEP_RECENT + 1);
    out.push(ContextMessage::new(Role::System, summarize(older)));
    out.extend_from_slice(recent);
    Some(out)
}

fn summarize(older: &[ContextMessage]) -> String {
    let users = older.iter().filter(|m| m.role == Role::User).count();
    let assistants = older.iter().filter(|m| m.role == Role::Assistant).count();
    format!(
        "Summary of {} earlier messages ({users} user, {assistants} assistant).",
        older.len()
    )
}
