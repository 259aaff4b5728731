//! MCP prompt implementations.

pub mod download_document;
pub mod recover_download;
pub mod registry;

pub use registry::PromptRegistry;
