//! Tiered session memory for Vireo.
//!
//! - [`ShortTermStore`]: recent turns, bounded per session, lazily expired.
//! - [`WorkingStore`]: per-session scratch values with FIFO eviction.
//! - [`LongTermStore`]: embedded and searchable, backed by a
//!   [`VectorStore`](vireo_core::VectorStore) and a
//!   [`MetadataStore`](vireo_core::MetadataStore).
//! - [`DocumentStore`]: ingested reference documents for knowledge answers.
//! - [`MemoryManager`]: routes writes between tiers, ranks reads across them,
//!   and compresses busy sessions into long-term digests.

pub mod compressor;
pub mod documents;
pub mod in_memory;
pub mod long_term;
pub mod manager;
pub mod short_term;
pub mod vector;
pub mod working;

#[cfg(test)]
mod test_helpers;

pub use compressor::Compressor;
pub use documents::{Document, DocumentHit, DocumentStore};
pub use in_memory::{InMemoryMetadataStore, InMemoryVectorStore};
pub use long_term::LongTermStore;
pub use manager::{MemoryManager, Recall};
pub use short_term::ShortTermStore;
pub use working::{WorkingEntry, WorkingStore};
