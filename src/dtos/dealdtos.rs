// dtos/dealdtos.rs
use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::utils::decimal::to_money;
use crate::models::{
    dealmodels::*,
    productmodel::ProductSummary,
    usermodel::UserSummary,
};

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CreateOfferDto {
    pub product_id: Uuid,

    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: i32,

    /// Only honoured when the offer comes from the product owner.
    pub total_price: Option<BigDecimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct CancelDealDto {
    #[validate(length(max = 500, message = "Cancellation reason cannot exceed 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SubmitReviewDto {
    pub seller_rating: i32,

    #[validate(length(max = 2000, message = "Comment cannot exceed 2000 characters"))]
    #[serde(default)]
    pub seller_comment: String,

    pub product_rating: i32,

    #[validate(length(max = 2000, message = "Comment cannot exceed 2000 characters"))]
    #[serde(default)]
    pub product_comment: String,
}

/// A deal as seen by one of its parties.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DealResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub product: ProductSummary,
    pub farmer: Option<UserSummary>,
    pub buyer: Option<UserSummary>,
    pub creator: Option<UserSummary>,
    pub other_party: Option<UserSummary>,
    pub quantity: i32,
    #[serde(with = "crate::utils::decimal::fixed")]
    pub unit_price: BigDecimal,
    #[serde(with = "crate::utils::decimal::fixed")]
    pub total_price: BigDecimal,
    pub status: DealStatus,
    pub status_label: String,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
    pub time_until_expiry: i64,
    pub has_review: bool,
    #[serde(flatten)]
    pub capabilities: DealCapabilities,
}

impl DealResponse {
    pub fn build(
        deal: &Deal,
        viewer: Uuid,
        now: DateTime<Utc>,
        has_review: bool,
        product: ProductSummary,
        users: &HashMap<Uuid, UserSummary>,
    ) -> Self {
        let summary = |user_id: Uuid| users.get(&user_id).cloned();

        DealResponse {
            id: deal.id,
            conversation_id: deal.conversation_id,
            product,
            farmer: summary(deal.farmer_id),
            buyer: summary(deal.buyer_id),
            creator: summary(deal.creator_id()),
            other_party: summary(deal.other_party(viewer)),
            quantity: deal.quantity,
            unit_price: to_money(&deal.unit_price),
            total_price: to_money(&deal.total_price),
            status: deal.status,
            status_label: deal.status.label().to_string(),
            cancelled_by: deal.cancelled_by,
            cancellation_reason: deal.cancellation_reason.clone(),
            created_at: deal.created_at,
            confirmed_at: deal.confirmed_at,
            completed_at: deal.completed_at,
            expires_at: deal.expires_at,
            is_expired: deal.is_expired_at(now),
            time_until_expiry: deal.seconds_until_expiry(now),
            has_review,
            capabilities: deal.capabilities(viewer, now, has_review),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DealListResponseDto {
    pub status: String,
    pub data: Vec<DealResponse>,
    pub results: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub review: Review,
    pub farmer_rating: RatingSummary,
    pub product_rating: RatingSummary,
}
