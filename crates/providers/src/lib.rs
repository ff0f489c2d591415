//! Language-model provider implementations for Vireo.
//!
//! All providers implement the `vireo_core::Provider` trait.
//! [`build_from_config`] assembles the configured stack.

pub mod builder;
pub mod embedder;
pub mod fallback;
pub mod openai_compat;

pub use builder::build_from_config;
pub use embedder::ProviderEmbedder;
pub use fallback::FallbackProvider;
pub use openai_compat::OpenAiCompatProvider;
