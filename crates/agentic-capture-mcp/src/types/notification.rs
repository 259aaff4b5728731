//! Notifications the server sends on its own.

use super::message::JsonRpcNotification;

pub const RESOURCE_LIST_CHANGED: &str = "notifications/resources/list_changed";

/// Sent after each artifact write so the client re-lists resources.
pub fn resource_list_changed() -> JsonRpcNotification {
    JsonRpcNotification::new(RESOURCE_LIST_CHANGED, None)
}
