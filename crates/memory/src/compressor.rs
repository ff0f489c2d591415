//! Turns a run of short-term memories into a single digest string.

use vireo_core::memory::Memory;

/// Templated digest: a count line plus the first few excerpts.
#[derive(Debug, Clone)]
pub struct Compressor {
    max_excerpts: usize,
    excerpt_chars: usize,
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            max_excerpts: 3,
            excerpt_chars: 100,
        }
    }
}

impl Compressor {
    pub fn new(max_excerpts: usize, excerpt_chars: usize) -> Self {
        Self {
            max_excerpts,
            excerpt_chars,
        }
    }

    pub fn compress(&self, memories: &[Memory]) -> String {
        let mut summary = format!(
            "Session contains {} memories, main content:",
            memories.len()
        );
        for memory in memories.iter().take(self.max_excerpts) {
            summary.push_str("\n- ");
            summary.push_str(&truncate_chars(&memory.content, self.excerpt_chars));
        }
        summary
    }
}

/// Cut at a char boundary, marking the cut with "...".
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
