// models/dealmodels.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::service::error::ServiceError;
use crate::utils::decimal::BigDecimalHelpers;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "deal_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Pending,
    Confirmed,
    Declined,
    Cancelled,
    Completed,
}

impl DealStatus {
    pub fn label(&self) -> &str {
        match self {
            DealStatus::Pending => "Pending",
            DealStatus::Confirmed => "Confirmed",
            DealStatus::Declined => "Declined",
            DealStatus::Cancelled => "Cancelled",
            DealStatus::Completed => "Completed",
        }
    }
}

/// Who put the offer on the table. Deals written before the creator was recorded
/// carry no value; those are treated as created by the farmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealCreator {
    Participant(Uuid),
    Unrecorded,
}

impl From<Option<Uuid>> for DealCreator {
    fn from(created_by: Option<Uuid>) -> Self {
        match created_by {
            Some(user_id) => DealCreator::Participant(user_id),
            None => DealCreator::Unrecorded,
        }
    }
}

impl DealCreator {
    pub fn resolve(self, farmer_id: Uuid) -> Uuid {
        match self {
            DealCreator::Participant(user_id) => user_id,
            DealCreator::Unrecorded => farmer_id,
        }
    }
}

/// What a permitted cancel does to the product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelEffect {
    /// Pending offer withdrawn by its creator, nothing was reserved.
    Withdraw,
    /// Confirmed deal called off, the reserved quantity goes back on the shelf.
    ReleaseStock,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Deal {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub product_id: Uuid,
    pub farmer_id: Uuid,
    pub buyer_id: Uuid,
    created_by: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub total_price: BigDecimal,
    pub status: DealStatus,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct DealCapabilities {
    pub can_accept: bool,
    pub can_decline: bool,
    pub can_cancel: bool,
    pub can_complete: bool,
    pub can_review: bool,
}

impl Deal {
    pub fn creator(&self) -> DealCreator {
        DealCreator::from(self.created_by)
    }

    pub fn creator_id(&self) -> Uuid {
        self.creator().resolve(self.farmer_id)
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        user_id == self.farmer_id || user_id == self.buyer_id
    }

    /// The party expected to answer the offer.
    pub fn responder_id(&self) -> Uuid {
        if self.creator_id() == self.farmer_id {
            self.buyer_id
        } else {
            self.farmer_id
        }
    }

    pub fn other_party(&self, user_id: Uuid) -> Uuid {
        if user_id == self.farmer_id {
            self.buyer_id
        } else {
            self.farmer_id
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DealStatus::Pending && now >= self.expires_at
    }

    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        if self.status != DealStatus::Pending {
            return 0;
        }
        (self.expires_at - now).num_seconds().max(0)
    }

    fn invalid_state(&self, reason: &str) -> ServiceError {
        ServiceError::InvalidState(self.id, self.status, reason.to_string())
    }

    fn require_responder(&self, actor: Uuid, action: &str) -> Result<(), ServiceError> {
        if !self.is_party(actor) {
            return Err(ServiceError::Forbidden(format!(
                "Only the parties to this deal can {} it",
                action
            )));
        }
        if actor == self.creator_id() {
            return Err(ServiceError::Forbidden(format!(
                "You cannot {} your own offer",
                action
            )));
        }
        Ok(())
    }

    pub fn authorize_accept(&self, actor: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError> {
        self.require_responder(actor, "accept")?;

        if self.status != DealStatus::Pending {
            return Err(self.invalid_state("only pending offers can be accepted"));
        }
        if self.is_expired_at(now) {
            return Err(self.invalid_state("this offer has expired"));
        }
        Ok(())
    }

    pub fn authorize_decline(&self, actor: Uuid) -> Result<(), ServiceError> {
        self.require_responder(actor, "decline")?;

        if self.status != DealStatus::Pending {
            return Err(self.invalid_state("only pending offers can be declined"));
        }
        Ok(())
    }

    pub fn authorize_cancel(&self, actor: Uuid) -> Result<CancelEffect, ServiceError> {
        if !self.is_party(actor) {
            return Err(ServiceError::Forbidden(
                "Only the parties to this deal can cancel it".to_string(),
            ));
        }

        match self.status {
            DealStatus::Pending if actor == self.creator_id() => Ok(CancelEffect::Withdraw),
            DealStatus::Pending => Err(ServiceError::Forbidden(
                "Only the creator can withdraw a pending offer; decline it instead".to_string(),
            )),
            DealStatus::Confirmed => Ok(CancelEffect::ReleaseStock),
            _ => Err(self.invalid_state("only pending or confirmed deals can be cancelled")),
        }
    }

    pub fn authorize_complete(&self, actor: Uuid) -> Result<(), ServiceError> {
        if actor != self.buyer_id {
            return Err(ServiceError::Forbidden(
                "Only the buyer can mark a deal as completed".to_string(),
            ));
        }
        if self.status != DealStatus::Confirmed {
            return Err(self.invalid_state("only confirmed deals can be completed"));
        }
        Ok(())
    }

    pub fn authorize_review(&self, actor: Uuid, already_reviewed: bool) -> Result<(), ServiceError> {
        if actor != self.buyer_id {
            return Err(ServiceError::Forbidden(
                "Only the buyer can review a deal".to_string(),
            ));
        }
        if self.status != DealStatus::Completed {
            return Err(self.invalid_state("only completed deals can be reviewed"));
        }
        if already_reviewed {
            return Err(ServiceError::AlreadyReviewed(self.id));
        }
        Ok(())
    }

    /// What `viewer` may do with this deal right now.
    pub fn capabilities(&self, viewer: Uuid, now: DateTime<Utc>, has_review: bool) -> DealCapabilities {
        DealCapabilities {
            can_accept: self.authorize_accept(viewer, now).is_ok(),
            can_decline: self.authorize_decline(viewer).is_ok(),
            can_cancel: self.authorize_cancel(viewer).is_ok(),
            can_complete: self.authorize_complete(viewer).is_ok(),
            can_review: self.authorize_review(viewer, has_review).is_ok(),
        }
    }
}

pub fn validate_rating(rating: i32) -> Result<i16, ServiceError> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ServiceError::InvalidRating(rating));
    }
    Ok(rating as i16)
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub reviewer_id: Uuid,
    pub seller_rating: i16,
    pub seller_comment: String,
    pub product_rating: i16,
    pub product_comment: String,
    pub created_at: DateTime<Utc>,
}

/// Average and count of a set of 1-5 ratings, average kept to two decimals.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RatingSummary {
    #[serde(with = "crate::utils::decimal::fixed")]
    pub average: BigDecimal,
    pub count: i32,
}

impl RatingSummary {
    pub fn from_ratings(ratings: &[i16]) -> Self {
        let count = ratings.len() as i32;
        let mean = if ratings.is_empty() {
            None
        } else {
            let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
            Some(BigDecimal::from(sum) / BigDecimal::from(count))
        };

        RatingSummary {
            average: mean.round_half_up(2),
            count,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use num_traits::Zero;
    use std::str::FromStr;

    pub(crate) struct Parties {
        pub farmer: Uuid,
        pub buyer: Uuid,
        pub outsider: Uuid,
    }

    pub(crate) fn parties() -> Parties {
        Parties {
            farmer: Uuid::new_v4(),
            buyer: Uuid::new_v4(),
            outsider: Uuid::new_v4(),
        }
    }

    pub(crate) fn deal(p: &Parties, created_by: Option<Uuid>, status: DealStatus) -> Deal {
        let now = Utc::now();
        Deal {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            farmer_id: p.farmer,
            buyer_id: p.buyer,
            created_by,
            quantity: 20,
            unit_price: BigDecimal::from_str("50.00").unwrap(),
            total_price: BigDecimal::from_str("1000.00").unwrap(),
            status,
            cancelled_by: None,
            cancellation_reason: None,
            created_at: now,
            confirmed_at: None,
            completed_at: None,
            expires_at: now + Duration::minutes(15),
            updated_at: now,
        }
    }

    fn kind(result: Result<impl std::fmt::Debug, ServiceError>) -> &'static str {
        result.unwrap_err().kind()
    }

    #[test]
    fn test_unrecorded_creator_resolves_to_farmer() {
        let p = parties();
        let legacy = deal(&p, None, DealStatus::Pending);
        assert_eq!(legacy.creator(), DealCreator::Unrecorded);
        assert_eq!(legacy.creator_id(), p.farmer);
        assert_eq!(legacy.responder_id(), p.buyer);

        let by_buyer = deal(&p, Some(p.buyer), DealStatus::Pending);
        assert_eq!(by_buyer.creator(), DealCreator::Participant(p.buyer));
        assert_eq!(by_buyer.responder_id(), p.farmer);
    }

    #[test]
    fn test_creator_cannot_accept_or_decline_own_offer() {
        let p = parties();
        let now = Utc::now();

        let by_farmer = deal(&p, Some(p.farmer), DealStatus::Pending);
        assert_eq!(kind(by_farmer.authorize_accept(p.farmer, now)), "forbidden");
        assert_eq!(kind(by_farmer.authorize_decline(p.farmer)), "forbidden");
        assert!(by_farmer.authorize_accept(p.buyer, now).is_ok());

        let by_buyer = deal(&p, Some(p.buyer), DealStatus::Pending);
        assert_eq!(kind(by_buyer.authorize_accept(p.buyer, now)), "forbidden");
        assert!(by_buyer.authorize_accept(p.farmer, now).is_ok());
        assert!(by_buyer.authorize_decline(p.farmer).is_ok());
    }

    #[test]
    fn test_outsider_is_forbidden_everywhere() {
        let p = parties();
        let now = Utc::now();
        let pending = deal(&p, Some(p.farmer), DealStatus::Pending);

        assert_eq!(kind(pending.authorize_accept(p.outsider, now)), "forbidden");
        assert_eq!(kind(pending.authorize_decline(p.outsider)), "forbidden");
        assert_eq!(kind(pending.authorize_cancel(p.outsider)), "forbidden");
        assert_eq!(kind(pending.authorize_complete(p.outsider)), "forbidden");
        assert_eq!(kind(pending.authorize_review(p.outsider, false)), "forbidden");
    }

    #[test]
    fn test_expired_offer_cannot_be_accepted() {
        let p = parties();
        let mut offer = deal(&p, Some(p.farmer), DealStatus::Pending);
        offer.expires_at = Utc::now() - Duration::seconds(1);

        assert_eq!(kind(offer.authorize_accept(p.buyer, Utc::now())), "invalid_state");
        assert!(offer.is_expired_at(Utc::now()));
        assert_eq!(offer.seconds_until_expiry(Utc::now()), 0);
    }

    #[test]
    fn test_accept_after_success_is_invalid_state() {
        let p = parties();
        let confirmed = deal(&p, Some(p.farmer), DealStatus::Confirmed);
        assert_eq!(kind(confirmed.authorize_accept(p.buyer, Utc::now())), "invalid_state");
        assert_eq!(kind(confirmed.authorize_decline(p.buyer)), "invalid_state");
    }

    #[test]
    fn test_cancel_rules() {
        let p = parties();

        let pending = deal(&p, Some(p.buyer), DealStatus::Pending);
        assert_eq!(pending.authorize_cancel(p.buyer).unwrap(), CancelEffect::Withdraw);
        assert_eq!(kind(pending.authorize_cancel(p.farmer)), "forbidden");

        let confirmed = deal(&p, Some(p.buyer), DealStatus::Confirmed);
        assert_eq!(confirmed.authorize_cancel(p.farmer).unwrap(), CancelEffect::ReleaseStock);
        assert_eq!(confirmed.authorize_cancel(p.buyer).unwrap(), CancelEffect::ReleaseStock);

        for status in [DealStatus::Declined, DealStatus::Cancelled, DealStatus::Completed] {
            let closed = deal(&p, Some(p.buyer), status);
            assert_eq!(kind(closed.authorize_cancel(p.buyer)), "invalid_state");
        }
    }

    #[test]
    fn test_only_buyer_completes_confirmed_deal() {
        let p = parties();
        let confirmed = deal(&p, Some(p.farmer), DealStatus::Confirmed);
        assert!(confirmed.authorize_complete(p.buyer).is_ok());
        assert_eq!(kind(confirmed.authorize_complete(p.farmer)), "forbidden");

        let pending = deal(&p, Some(p.farmer), DealStatus::Pending);
        assert_eq!(kind(pending.authorize_complete(p.buyer)), "invalid_state");

        let completed = deal(&p, Some(p.farmer), DealStatus::Completed);
        assert_eq!(kind(completed.authorize_complete(p.buyer)), "invalid_state");
    }

    #[test]
    fn test_review_rules() {
        let p = parties();
        let completed = deal(&p, Some(p.farmer), DealStatus::Completed);
        assert!(completed.authorize_review(p.buyer, false).is_ok());
        assert_eq!(kind(completed.authorize_review(p.buyer, true)), "already_reviewed");
        assert_eq!(kind(completed.authorize_review(p.farmer, false)), "forbidden");

        let confirmed = deal(&p, Some(p.farmer), DealStatus::Confirmed);
        assert_eq!(kind(confirmed.authorize_review(p.buyer, false)), "invalid_state");
    }

    #[test]
    fn test_rating_bounds() {
        assert_eq!(validate_rating(1).unwrap(), 1);
        assert_eq!(validate_rating(5).unwrap(), 5);
        assert_eq!(kind(validate_rating(0)), "invalid_rating");
        assert_eq!(kind(validate_rating(6)), "invalid_rating");
    }

    #[test]
    fn test_capabilities_follow_the_viewer() {
        let p = parties();
        let now = Utc::now();

        let pending = deal(&p, Some(p.farmer), DealStatus::Pending);
        let buyer_view = pending.capabilities(p.buyer, now, false);
        assert!(buyer_view.can_accept && buyer_view.can_decline);
        assert!(!buyer_view.can_cancel && !buyer_view.can_complete);

        let farmer_view = pending.capabilities(p.farmer, now, false);
        assert!(!farmer_view.can_accept && !farmer_view.can_decline);
        assert!(farmer_view.can_cancel);

        let confirmed = deal(&p, Some(p.farmer), DealStatus::Confirmed);
        assert!(confirmed.capabilities(p.buyer, now, false).can_complete);
        assert!(confirmed.capabilities(p.farmer, now, false).can_cancel);
        assert!(!confirmed.capabilities(p.farmer, now, false).can_complete);

        let completed = deal(&p, Some(p.farmer), DealStatus::Completed);
        assert!(completed.capabilities(p.buyer, now, false).can_review);
        assert!(!completed.capabilities(p.buyer, now, true).can_review);
        assert_eq!(completed.capabilities(p.outsider, now, false), DealCapabilities::default());
    }

    #[test]
    fn test_rating_summary() {
        let empty = RatingSummary::from_ratings(&[]);
        assert_eq!(empty.count, 0);
        assert!(empty.average.is_zero());
        assert_eq!(serde_json::to_value(&empty).unwrap()["average"], "0.00");

        let single = RatingSummary::from_ratings(&[5]);
        assert_eq!(single.average.to_string(), "5.00");
        assert_eq!(single.count, 1);

        let mixed = RatingSummary::from_ratings(&[5, 4, 4]);
        assert_eq!(mixed.average.to_string(), "4.33");

        let half = RatingSummary::from_ratings(&[5, 4, 4, 4, 4, 4]);
        // 25 / 6 = 4.1666..
        assert_eq!(half.average.to_string(), "4.17");
    }

    #[test]
    fn test_status_names() {
        assert_eq!(DealStatus::Cancelled.label(), "Cancelled");
        assert_eq!(serde_json::to_string(&DealStatus::Declined).unwrap(), "\"declined\"");
    }
}
