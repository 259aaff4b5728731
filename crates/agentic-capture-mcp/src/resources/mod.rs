//! MCP resources: stored artifacts, console output, and server stats.

pub mod artifact;
pub mod console;
pub mod registry;
pub mod stats;
pub mod templates;

pub use registry::ResourceRegistry;
