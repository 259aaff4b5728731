//! AgenticCapture MCP Server: browser file acquisition for LLM agents.

pub mod config;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::{resolve_download_dir, ServerConfig};
pub use protocol::ProtocolHandler;
pub use session::CaptureSessionManager;
pub use transport::StdioTransport;
