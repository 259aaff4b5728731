//! Protocol errors and their JSON-RPC codes.
//!
//! Failures of a browser action or an acquisition are not protocol errors.
//! They are reported as error tool results so the client can show them.

use super::message::{JsonRpcReply, RequestId};

/// JSON-RPC 2.0 codes, the MCP range, and the capture server's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    ResourceNotFound = -32802,
    ToolNotFound = -32803,
    PromptNotFound = -32804,
    ArtifactNotFound = -32850,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("No artifact named {0:?}")]
    ArtifactNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            McpError::ParseError(_) => ErrorCode::ParseError,
            McpError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            McpError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            McpError::InvalidParams(_) => ErrorCode::InvalidParams,
            McpError::InternalError(_) | McpError::Io(_) | McpError::Json(_) => {
                ErrorCode::InternalError
            }
            McpError::ResourceNotFound(_) => ErrorCode::ResourceNotFound,
            McpError::ToolNotFound(_) => ErrorCode::ToolNotFound,
            McpError::PromptNotFound(_) => ErrorCode::PromptNotFound,
            McpError::ArtifactNotFound(_) => ErrorCode::ArtifactNotFound,
        }
    }

    pub fn code(&self) -> i32 {
        self.error_code().code()
    }

    pub fn reply(&self, id: RequestId) -> JsonRpcReply {
        JsonRpcReply::failure(id, self.code(), self.to_string())
    }
}

pub type McpResult<T> = Result<T, McpError>;
