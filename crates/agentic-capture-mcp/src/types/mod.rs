//! Wire types: JSON-RPC envelopes and the MCP payloads the capture server speaks.

pub mod capabilities;
pub mod error;
pub mod message;
pub mod notification;
pub mod prompts;
pub mod resources;
pub mod tools;

pub use capabilities::*;
pub use error::*;
pub use message::*;
pub use notification::*;
pub use prompts::*;
pub use resources::*;
pub use tools::*;
