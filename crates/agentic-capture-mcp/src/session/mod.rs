//! Browser session shared by all tool calls.

pub mod manager;

pub use manager::{CaptureSessionManager, DriverSource, SessionError, SessionStats};
