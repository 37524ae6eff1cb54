// db/dealdb.rs
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{Error, PgConnection};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::dealmodels::*;

const DEAL_COLUMNS: &str = r#"
    id, conversation_id, product_id, farmer_id, buyer_id, created_by, quantity,
    unit_price, total_price, status, cancelled_by, cancellation_reason,
    created_at, confirmed_at, completed_at, expires_at, updated_at
"#;

const REVIEW_COLUMNS: &str = r#"
    id, deal_id, reviewer_id, seller_rating, seller_comment,
    product_rating, product_comment, created_at
"#;

pub struct NewDeal {
    pub conversation_id: Uuid,
    pub product_id: Uuid,
    pub farmer_id: Uuid,
    pub buyer_id: Uuid,
    pub created_by: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub total_price: BigDecimal,
    pub expires_at: DateTime<Utc>,
}

pub struct NewReview {
    pub deal_id: Uuid,
    pub reviewer_id: Uuid,
    pub seller_rating: i16,
    pub seller_comment: String,
    pub product_rating: i16,
    pub product_comment: String,
}

#[async_trait]
pub trait DealExt {
    async fn get_deal(&self, deal_id: Uuid) -> Result<Option<Deal>, Error>;

    async fn get_conversation_deals(&self, conversation_id: Uuid) -> Result<Vec<Deal>, Error>;

    /// Deal ids among `deal_ids` that already carry a review.
    async fn get_reviewed_deal_ids(&self, deal_ids: &[Uuid]) -> Result<Vec<Uuid>, Error>;
}

#[async_trait]
impl DealExt for DBClient {
    async fn get_deal(&self, deal_id: Uuid) -> Result<Option<Deal>, Error> {
        sqlx::query_as::<_, Deal>(&format!("SELECT {} FROM deals WHERE id = $1", DEAL_COLUMNS))
            .bind(deal_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_conversation_deals(&self, conversation_id: Uuid) -> Result<Vec<Deal>, Error> {
        sqlx::query_as::<_, Deal>(&format!(
            r#"
            SELECT {}
            FROM deals
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            "#,
            DEAL_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_reviewed_deal_ids(&self, deal_ids: &[Uuid]) -> Result<Vec<Uuid>, Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT deal_id FROM reviews WHERE deal_id = ANY($1)")
            .bind(deal_ids)
            .fetch_all(&self.pool)
            .await
    }
}

/// Exclusive row lock on the deal. Always taken before the product lock.
pub async fn lock_deal(conn: &mut PgConnection, deal_id: Uuid) -> Result<Option<Deal>, Error> {
    sqlx::query_as::<_, Deal>(&format!(
        "SELECT {} FROM deals WHERE id = $1 FOR UPDATE",
        DEAL_COLUMNS
    ))
    .bind(deal_id)
    .fetch_optional(conn)
    .await
}

pub async fn insert_deal(conn: &mut PgConnection, deal: NewDeal) -> Result<Deal, Error> {
    sqlx::query_as::<_, Deal>(&format!(
        r#"
        INSERT INTO deals (
            conversation_id, product_id, farmer_id, buyer_id, created_by,
            quantity, unit_price, total_price, status, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
        RETURNING {}
        "#,
        DEAL_COLUMNS
    ))
    .bind(deal.conversation_id)
    .bind(deal.product_id)
    .bind(deal.farmer_id)
    .bind(deal.buyer_id)
    .bind(deal.created_by)
    .bind(deal.quantity)
    .bind(deal.unit_price)
    .bind(deal.total_price)
    .bind(deal.expires_at)
    .fetch_one(conn)
    .await
}

pub async fn mark_confirmed(conn: &mut PgConnection, deal_id: Uuid) -> Result<Deal, Error> {
    sqlx::query_as::<_, Deal>(&format!(
        r#"
        UPDATE deals
        SET status = 'confirmed', confirmed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING {}
        "#,
        DEAL_COLUMNS
    ))
    .bind(deal_id)
    .fetch_one(conn)
    .await
}

pub async fn mark_declined(conn: &mut PgConnection, deal_id: Uuid) -> Result<Deal, Error> {
    sqlx::query_as::<_, Deal>(&format!(
        r#"
        UPDATE deals
        SET status = 'declined', updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING {}
        "#,
        DEAL_COLUMNS
    ))
    .bind(deal_id)
    .fetch_one(conn)
    .await
}

pub async fn mark_cancelled(
    conn: &mut PgConnection,
    deal_id: Uuid,
    cancelled_by: Uuid,
    reason: Option<String>,
) -> Result<Deal, Error> {
    sqlx::query_as::<_, Deal>(&format!(
        r#"
        UPDATE deals
        SET status = 'cancelled', cancelled_by = $2, cancellation_reason = $3, updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'confirmed')
        RETURNING {}
        "#,
        DEAL_COLUMNS
    ))
    .bind(deal_id)
    .bind(cancelled_by)
    .bind(reason)
    .fetch_one(conn)
    .await
}

pub async fn mark_completed(conn: &mut PgConnection, deal_id: Uuid) -> Result<Deal, Error> {
    sqlx::query_as::<_, Deal>(&format!(
        r#"
        UPDATE deals
        SET status = 'completed', completed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'confirmed'
        RETURNING {}
        "#,
        DEAL_COLUMNS
    ))
    .bind(deal_id)
    .fetch_one(conn)
    .await
}

pub async fn review_exists(conn: &mut PgConnection, deal_id: Uuid) -> Result<bool, Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM reviews WHERE deal_id = $1)")
        .bind(deal_id)
        .fetch_one(conn)
        .await
}

pub async fn insert_review(conn: &mut PgConnection, review: NewReview) -> Result<Review, Error> {
    sqlx::query_as::<_, Review>(&format!(
        r#"
        INSERT INTO reviews (
            deal_id, reviewer_id, seller_rating, seller_comment, product_rating, product_comment
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        REVIEW_COLUMNS
    ))
    .bind(review.deal_id)
    .bind(review.reviewer_id)
    .bind(review.seller_rating)
    .bind(review.seller_comment)
    .bind(review.product_rating)
    .bind(review.product_comment)
    .fetch_one(conn)
    .await
}

/// Every seller rating left on deals where `farmer_id` was the farmer.
pub async fn farmer_seller_ratings(conn: &mut PgConnection, farmer_id: Uuid) -> Result<Vec<i16>, Error> {
    sqlx::query_scalar::<_, i16>(
        r#"
        SELECT r.seller_rating
        FROM reviews r
        INNER JOIN deals d ON d.id = r.deal_id
        WHERE d.farmer_id = $1
        "#
    )
    .bind(farmer_id)
    .fetch_all(conn)
    .await
}

/// Every product rating left on deals for `product_id`.
pub async fn product_ratings(conn: &mut PgConnection, product_id: Uuid) -> Result<Vec<i16>, Error> {
    sqlx::query_scalar::<_, i16>(
        r#"
        SELECT r.product_rating
        FROM reviews r
        INNER JOIN deals d ON d.id = r.deal_id
        WHERE d.product_id = $1
        "#
    )
    .bind(product_id)
    .fetch_all(conn)
    .await
}
