// db/productdb.rs
use async_trait::async_trait;
use sqlx::PgConnection;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::{dealmodels::RatingSummary, productmodel::Product};

const PRODUCT_COLUMNS: &str = r#"
    id, farmer_id, name, description, price, unit, stock_quantity, location,
    is_active, total_sales, average_rating, rating_count, created_at, updated_at
"#;

#[async_trait]
pub trait ProductExt {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, sqlx::Error>;
}

#[async_trait]
impl ProductExt for DBClient {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
    }
}

pub async fn get_product(conn: &mut PgConnection, product_id: Uuid) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE id = $1",
        PRODUCT_COLUMNS
    ))
    .bind(product_id)
    .fetch_optional(conn)
    .await
}

/// Exclusive row lock on the product for the rest of the transaction.
pub async fn lock_product(conn: &mut PgConnection, product_id: Uuid) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE id = $1 FOR UPDATE",
        PRODUCT_COLUMNS
    ))
    .bind(product_id)
    .fetch_optional(conn)
    .await
}

/// Writes the new stock level, refusing to go below zero even if a caller skipped
/// the lock. Returns the stored level, or `None` when the guard rejected the write.
pub async fn set_stock_quantity(
    conn: &mut PgConnection,
    product_id: Uuid,
    expected_current: i32,
    new_quantity: i32,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE products
        SET stock_quantity = $3, updated_at = NOW()
        WHERE id = $1 AND stock_quantity = $2 AND $3 >= 0
        RETURNING stock_quantity
        "#
    )
    .bind(product_id)
    .bind(expected_current)
    .bind(new_quantity)
    .fetch_optional(conn)
    .await
}

pub async fn add_total_sales(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE products
        SET total_sales = total_sales + $2, updated_at = NOW()
        WHERE id = $1
        RETURNING total_sales
        "#
    )
    .bind(product_id)
    .bind(quantity)
    .fetch_one(conn)
    .await
}

pub async fn update_product_rating(
    conn: &mut PgConnection,
    product_id: Uuid,
    summary: &RatingSummary,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE products
        SET average_rating = $2, rating_count = $3, updated_at = NOW()
        WHERE id = $1
        "#
    )
    .bind(product_id)
    .bind(&summary.average)
    .bind(summary.count)
    .execute(conn)
    .await?;

    Ok(())
}
