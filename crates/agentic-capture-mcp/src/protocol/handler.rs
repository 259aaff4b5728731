//! Request dispatcher: routes JSON-RPC messages to tools, resources, and prompts.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::prompts::PromptRegistry;
use crate::resources::ResourceRegistry;
use crate::session::CaptureSessionManager;
use crate::tools::ToolRegistry;
use crate::types::*;

use super::negotiation::ClientSession;
use super::validator::validate_request;

pub struct ProtocolHandler {
    session: Arc<CaptureSessionManager>,
    client: Mutex<ClientSession>,
}

impl ProtocolHandler {
    pub fn new(session: Arc<CaptureSessionManager>) -> Self {
        Self {
            session,
            client: Mutex::new(ClientSession::default()),
        }
    }

    pub fn session(&self) -> &Arc<CaptureSessionManager> {
        &self.session
    }

    /// Handles one inbound message. Returns the response for requests and
    /// `None` for notifications.
    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<Value> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif).await;
                None
            }
            JsonRpcMessage::Reply { id } => {
                tracing::debug!(%id, "Dropping reply from client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Value {
        let reply = match validate_request(&request) {
            Err(e) => e.reply(request.id),
            Ok(()) => match self.dispatch_request(&request).await {
                Ok(value) => JsonRpcReply::success(request.id, value),
                Err(e) => {
                    tracing::debug!(method = %request.method, error = %e, "Request failed");
                    e.reply(request.id)
                }
            },
        };
        serde_json::to_value(reply).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Could not encode reply");
            Value::Null
        })
    }

    async fn dispatch_request(&self, request: &JsonRpcRequest) -> McpResult<Value> {
        let params = request.params.clone();
        match request.method.as_str() {
            "initialize" => self.handle_initialize(params).await,
            "shutdown" => self.handle_shutdown().await,
            "ping" => Ok(empty()),

            "tools/list" => to_value(ToolListResult {
                tools: ToolRegistry::list_tools(),
            }),
            "tools/call" => {
                let call: ToolCallParams = required(params, "Tool call params required")?;
                let result = ToolRegistry::call(&call.name, call.arguments, &self.session).await?;
                to_value(result)
            }

            "resources/list" => to_value(ResourceListResult {
                resources: ResourceRegistry::list_resources(&self.session),
            }),
            "resources/templates/list" => to_value(ResourceTemplateListResult {
                resource_templates: ResourceRegistry::list_templates(),
            }),
            "resources/read" => {
                let read: ResourceReadParams = required(params, "Resource read params required")?;
                to_value(ResourceRegistry::read(&read.uri, &self.session).await?)
            }

            "prompts/list" => to_value(PromptListResult {
                prompts: PromptRegistry::list_prompts(),
            }),
            "prompts/get" => {
                let get: PromptGetParams = required(params, "Prompt get params required")?;
                to_value(PromptRegistry::get(&get.name, get.arguments, &self.session)?)
            }

            _ => Err(McpError::MethodNotFound(request.method.clone())),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                self.client.lock().await.mark_initialized();
            }
            "notifications/cancelled" | "$/cancelRequest" => {
                tracing::info!("Received cancellation notification");
            }
            other => tracing::debug!(method = other, "Unknown notification"),
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let init: InitializeParams = required(params, "Initialize params required")?;
        let result = self.client.lock().await.negotiate(init);
        to_value(result)
    }

    async fn handle_shutdown(&self) -> McpResult<Value> {
        tracing::info!("Shutdown requested");
        self.session.shutdown().await;
        Ok(empty())
    }
}

fn required<T: DeserializeOwned>(params: Option<Value>, missing: &str) -> McpResult<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))?
        .ok_or_else(|| McpError::InvalidParams(missing.to_string()))
}

fn to_value(value: impl serde::Serialize) -> McpResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn empty() -> Value {
    Value::Object(serde_json::Map::new())
}
