//! Newline-delimited JSON framing.

use serde_json::Value;

use crate::types::{JsonRpcMessage, McpError, McpResult};

/// Malformed JSON is a parse error; well-formed JSON that is not a
/// JSON-RPC message is an invalid request.
pub fn parse_message(line: &str) -> McpResult<JsonRpcMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| McpError::ParseError(e.to_string()))?;
    if !value.is_object() {
        return Err(McpError::InvalidRequest(
            "message must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| McpError::InvalidRequest(e.to_string()))
}

/// One JSON document followed by `\n`.
pub fn frame_message(value: &impl serde::Serialize) -> McpResult<String> {
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_single_line() {
        let framed = frame_message(&serde_json::json!({"a": "x\ny"})).unwrap();
        assert_eq!(framed.matches('\n').count(), 1);
        assert!(framed.ends_with('\n'));
    }

    #[test]
    fn test_parse_error_kinds() {
        assert!(matches!(parse_message("   "), Err(McpError::ParseError(_))));
        assert!(matches!(parse_message("{not json}"), Err(McpError::ParseError(_))));
        assert!(matches!(parse_message("[1, 2]"), Err(McpError::InvalidRequest(_))));
        assert!(matches!(
            parse_message(r#"{"jsonrpc": "2.0", "id": 3}"#),
            Err(McpError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_message(r#"{"jsonrpc": "2.0", "id": 3, "method": "ping"}"#),
            Ok(JsonRpcMessage::Request(_))
        ));
    }
}
