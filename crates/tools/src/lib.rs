//! Tool access for Vireo.
//!
//! [`RemoteToolClient`] talks to an external tool endpoint over JSON-RPC;
//! [`ToolCatalog`] caches what any [`vireo_core::ToolProtocol`] offers.

pub mod catalog;
pub mod remote;
pub mod rpc;

pub use catalog::ToolCatalog;
pub use remote::RemoteToolClient;
