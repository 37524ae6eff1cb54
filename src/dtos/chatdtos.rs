// dtos/chatdtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    chatmodels::*,
    productmodel::ProductSummary,
    usermodel::UserSummary,
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MESSAGE_PAGE_SIZE: u32 = 30;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Either names the other user directly or a product, in which case the
/// product's owner is the other participant.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StartConversationDto {
    pub other_user_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SendMessageDto {
    #[validate(length(min = 1, max = 5000, message = "Message must be between 1 and 5000 characters"))]
    pub content: String,

    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

#[derive(Debug, Deserialize, Default)]
pub struct PaginationQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PaginationQuery {
    /// (limit, offset) with the page clamped to >= 1 and the limit to 1..=MAX_PAGE_SIZE.
    pub fn limit_offset(&self, default_limit: u32) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
        (limit as i64, ((page - 1) as i64) * limit as i64)
    }
}

#[derive(Debug, Deserialize)]
pub struct NewMessagesQuery {
    pub after: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub message_type_label: String,
    pub is_read: bool,
    pub delivery_status: DeliveryStatus,
    pub is_own: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn for_viewer(message: Message, viewer: Uuid) -> Self {
        MessageResponse {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            message_type_label: message.message_type.label().to_string(),
            message_type: message.message_type,
            is_read: message.is_read,
            delivery_status: message.delivery_status,
            is_own: message.sender_id == viewer,
            created_at: message.created_at,
            content: message.content,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ConversationWithDetails {
    pub conversation: Conversation,
    pub other_user: Option<UserSummary>,
    pub product: Option<ProductSummary>,
    pub last_message: Option<MessageResponse>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct TypingStatus {
    pub conversation_id: Uuid,
    pub other_user_typing: bool,
}
