//! Checks applied to a request before it is dispatched.

use serde_json::Value;

use crate::types::{JsonRpcRequest, McpError, McpResult, JSONRPC_VERSION};

pub fn validate_request(request: &JsonRpcRequest) -> McpResult<()> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{}\"",
            request.jsonrpc
        )));
    }
    if request.method.trim().is_empty() {
        return Err(McpError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }
    match &request.params {
        None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
        Some(Value::Array(_)) => Err(McpError::InvalidParams(
            "positional params are not supported".to_string(),
        )),
        Some(_) => Err(McpError::InvalidRequest(
            "params must be an object".to_string(),
        )),
    }
}
