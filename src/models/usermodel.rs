// models/usermodel.rs
use chrono::prelude::*;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "user_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Farmer,
    Buyer,
    Both,
}

impl UserType {
    pub fn is_farmer(&self) -> bool {
        matches!(self, UserType::Farmer | UserType::Both)
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    pub user_type: UserType,
    pub is_verified: bool,
    pub average_farmer_rating: BigDecimal,
    pub farmer_rating_count: i32,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_farmer(&self) -> bool {
        self.user_type.is_farmer()
    }
}

/// Public view of a user embedded in conversation and deal payloads.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_by_user_type() {
        assert!(UserType::Farmer.is_farmer());
        assert!(UserType::Both.is_farmer());
        assert!(!UserType::Buyer.is_farmer());
    }

    #[test]
    fn test_user_type_wire_names() {
        assert_eq!(serde_json::to_string(&UserType::Both).unwrap(), "\"both\"");
    }
}
