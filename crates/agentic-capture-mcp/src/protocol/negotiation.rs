//! Per-connection handshake state.

use crate::types::{Implementation, InitializeParams, InitializeResult, MCP_VERSION};

#[derive(Debug, Default)]
pub struct ClientSession {
    pub client: Option<Implementation>,
    pub protocol_version: Option<String>,
    pub initialized: bool,
}

impl ClientSession {
    /// Records who connected. A client asking for another protocol revision
    /// still gets this server's revision; it decides whether to continue.
    pub fn negotiate(&mut self, params: InitializeParams) -> InitializeResult {
        if params.protocol_version != MCP_VERSION {
            tracing::warn!(
                requested = %params.protocol_version,
                supported = MCP_VERSION,
                "Client asked for a different protocol version"
            );
        }
        tracing::info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            "Client connected"
        );
        self.protocol_version = Some(params.protocol_version);
        self.client = Some(params.client_info);
        InitializeResult::capture_server()
    }

    pub fn mark_initialized(&mut self) {
        if self.client.is_none() {
            tracing::warn!("initialized notification before initialize");
        }
        self.initialized = true;
        tracing::info!("MCP handshake complete");
    }
}
