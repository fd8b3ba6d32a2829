//! Event protocol spoken over the WebSocket, namespaced by concern.
//!
//! Inbound events are a tagged enum so malformed payloads are rejected at the
//! edge, before any service logic runs. Outbound traffic is either a named
//! event frame (see [`crate::websocket::outbound_frame`]) or the uniform
//! `{success, data?, message?}` envelope.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-pushed event names.
pub mod event {
    pub const CONNECTED: &str = "connected";
    pub const ERROR: &str = "error";
    pub const CONVERSATION_LIST_RESPONSE: &str = "conversation_list_response";
    pub const CONVERSATION_RESPONSE: &str = "conversation_response";
    pub const CONVERSATION_UPDATE: &str = "conversation_update";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    #[serde(rename = "conversation_load_list")]
    ConversationLoadList {
        page: Option<i64>,
        limit: Option<i64>,
        search: Option<String>,
    },

    #[serde(rename = "conversation_load")]
    ConversationLoad {
        conversation_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    },

    #[serde(rename = "conversation_initiate")]
    ConversationInitiate { user_id: Uuid },

    #[serde(rename = "conversation_delete")]
    ConversationDelete { conversation_id: Uuid },

    #[serde(rename = "conversation_archive")]
    ConversationArchive { conversation_id: Uuid },

    #[serde(rename = "conversation_block")]
    ConversationBlock { conversation_id: Uuid },

    #[serde(rename = "conversation_unblock")]
    ConversationUnblock { conversation_id: Uuid },
}

/// Uniform reply envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn to_json(&self) -> String {
        // Construction via json! cannot fail for this shape.
        serde_json::json!({
            "success": self.success,
            "data": self.data,
            "message": self.message,
        })
        .to_string()
    }
}
