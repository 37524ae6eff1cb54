// service/review_aggregator.rs
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::{dealdb, productdb, userdb},
    models::dealmodels::RatingSummary,
    service::error::ServiceError,
};

#[derive(Debug, Clone)]
pub struct RefreshedRatings {
    pub farmer: RatingSummary,
    pub product: RatingSummary,
}

/// Recomputes the farmer's seller rating and the product's rating from every
/// stored review. Must run in the transaction that inserted the new review, after
/// the deal lock; takes the farmer row lock, then the product row lock.
pub async fn refresh_ratings(
    conn: &mut PgConnection,
    farmer_id: Uuid,
    product_id: Uuid,
) -> Result<RefreshedRatings, ServiceError> {
    userdb::lock_user(&mut *conn, farmer_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Farmer".to_string()))?;

    productdb::lock_product(&mut *conn, product_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Product".to_string()))?;

    let seller_ratings = dealdb::farmer_seller_ratings(&mut *conn, farmer_id).await?;
    let farmer = RatingSummary::from_ratings(&seller_ratings);
    userdb::update_farmer_rating(&mut *conn, farmer_id, &farmer).await?;

    let product_ratings = dealdb::product_ratings(&mut *conn, product_id).await?;
    let product = RatingSummary::from_ratings(&product_ratings);
    productdb::update_product_rating(&mut *conn, product_id, &product).await?;

    tracing::info!(
        "Ratings refreshed: farmer {} -> {} ({}), product {} -> {} ({})",
        farmer_id, farmer.average, farmer.count,
        product_id, product.average, product.count
    );

    Ok(RefreshedRatings { farmer, product })
}
