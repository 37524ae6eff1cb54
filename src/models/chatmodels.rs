// models/chatmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "message_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    OrderRequest,
    PriceRequest,
}

impl MessageType {
    pub fn label(&self) -> &str {
        match self {
            MessageType::Text => "Text Message",
            MessageType::OrderRequest => "Order Request",
            MessageType::PriceRequest => "Price Request",
        }
    }
}

/// sent -> delivered -> read; a message never moves backwards.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Serialize, Clone, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_one_id: Option<Uuid>,
    pub participant_two_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn participants(&self) -> Vec<Uuid> {
        [self.participant_one_id, self.participant_two_id]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participant_one_id == Some(user_id) || self.participant_two_id == Some(user_id)
    }

    /// The participant that is not `user_id`, if that seat is still occupied.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if self.participant_one_id == Some(user_id) {
            self.participant_two_id
        } else if self.participant_two_id == Some(user_id) {
            self.participant_one_id
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub delivery_status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}
