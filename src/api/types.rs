//! API request and response types

use crate::db::ConversationId;
use serde::{Deserialize, Serialize};

/// Set to `true` by clients running without a signed-in user
pub const GUEST_MODE_HEADER: &str = "x-guest-mode";

/// Request to create a new conversation
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Request to send a chat message
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: ConversationId,
}

/// Simple success response
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
