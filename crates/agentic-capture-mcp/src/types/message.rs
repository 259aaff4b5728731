//! JSON-RPC 2.0 envelopes.
//!
//! Inbound lines are classified by the members they carry rather than by
//! trying each shape in turn. Everything the server writes is either a
//! [`JsonRpcReply`] or a [`JsonRpcNotification`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => f.write_str(s),
            RequestId::Null => f.write_str("null"),
        }
    }
}

/// A call the server must answer.
#[derive(Debug, Clone)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

/// Message without an id. Sent both ways; never answered.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Any inbound message.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawMessage")]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// The client answering something. This server never sends requests,
    /// so these are logged and dropped.
    Reply { id: RequestId },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    jsonrpc: String,
    /// `Some(RequestId::Null)` for an explicit `"id": null`, `None` when absent.
    #[serde(default, deserialize_with = "present")]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RequestId>, D::Error> {
    RequestId::deserialize(d).map(Some)
}

impl TryFrom<RawMessage> for JsonRpcMessage {
    type Error = String;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        match (raw.id, raw.method) {
            (Some(id), Some(method)) => Ok(JsonRpcMessage::Request(JsonRpcRequest {
                jsonrpc: raw.jsonrpc,
                id,
                method,
                params: raw.params,
            })),
            (None, Some(method)) => Ok(JsonRpcMessage::Notification(JsonRpcNotification {
                jsonrpc: raw.jsonrpc,
                method,
                params: raw.params,
            })),
            (Some(id), None) if raw.result.is_some() || raw.error.is_some() => {
                Ok(JsonRpcMessage::Reply { id })
            }
            _ => Err("message has no method and is not a reply".to_string()),
        }
    }
}

/// The server's answer to one request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcReply {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Serialized as a `result` or an `error` member of the reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorObject),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcReply {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn failure(id: RequestId, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: Outcome::Error(ErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<JsonRpcMessage, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn test_classifies_by_members() {
        let req = parse(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})).unwrap();
        assert!(matches!(req, JsonRpcMessage::Request(r) if r.id == RequestId::Number(7)));

        let note = parse(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        assert!(matches!(note, JsonRpcMessage::Notification(_)));

        let reply = parse(json!({"jsonrpc": "2.0", "id": "a", "result": {}})).unwrap();
        assert!(matches!(reply, JsonRpcMessage::Reply { .. }));

        assert!(parse(json!({"jsonrpc": "2.0", "id": 1})).is_err());
    }

    #[test]
    fn test_null_id_is_a_request() {
        let msg = parse(json!({"jsonrpc": "2.0", "id": null, "method": "ping"})).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Request(r) if r.id == RequestId::Null));
    }

    #[test]
    fn test_reply_has_one_outcome_member() {
        let ok = serde_json::to_value(JsonRpcReply::success(RequestId::Number(1), json!({"x": 1}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 1, "result": {"x": 1}}));

        let err = JsonRpcReply::failure("q".into(), -32601, "Method not found: x");
        assert!(err.is_error());
        let err = serde_json::to_value(err).unwrap();
        assert_eq!(err["error"]["code"], -32601);
        assert!(err.get("result").is_none());
    }
}
