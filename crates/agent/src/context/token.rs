//! Token estimation utilities.
//!
//! Uses a fixed byte-based heuristic: tokens ≈ bytes × 0.75, rounded up.
//! No tokenizer is consulted, so estimates are stable across models.

use vireo_core::message::Message;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    // ⌈len × 3/4⌉ in integer arithmetic
    (text.len() * 3).div_ceil(4)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}
