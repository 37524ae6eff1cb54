// service/stock_reservation.rs
//! Keeps a product's stock in line with the quantities held by confirmed deals.
//!
//! Every function here runs inside the caller's transaction and takes the product
//! row lock first, so the deal status change and the stock change commit together.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::productdb,
    models::productmodel::Product,
    service::error::ServiceError,
};

/// Stock left after setting `quantity` aside, or the shortfall.
pub fn remaining_after_reserve(available: i32, quantity: i32) -> Result<i32, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::Validation("Quantity must be greater than zero".to_string()));
    }
    if quantity > available {
        return Err(ServiceError::InsufficientStock {
            requested: quantity,
            available,
        });
    }
    Ok(available - quantity)
}

pub fn stock_after_release(available: i32, quantity: i32) -> Result<i32, ServiceError> {
    available
        .checked_add(quantity)
        .ok_or_else(|| ServiceError::Validation("Stock quantity overflow".to_string()))
}

async fn lock(conn: &mut PgConnection, product_id: Uuid) -> Result<Product, ServiceError> {
    productdb::lock_product(conn, product_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Product".to_string()))
}

/// Takes `quantity` out of the product's stock. Fails with `InsufficientStock`
/// carrying the level seen under the lock.
pub async fn reserve(conn: &mut PgConnection, product_id: Uuid, quantity: i32) -> Result<i32, ServiceError> {
    let product = lock(&mut *conn, product_id).await?;
    let remaining = remaining_after_reserve(product.stock_quantity, quantity)?;

    let stored = productdb::set_stock_quantity(&mut *conn, product_id, product.stock_quantity, remaining)
        .await?
        .ok_or(ServiceError::Busy)?;

    tracing::debug!(
        "Reserved {} of product {}: stock {} -> {}",
        quantity, product_id, product.stock_quantity, stored
    );
    Ok(stored)
}

/// Puts a cancelled deal's quantity back on the shelf.
pub async fn release(conn: &mut PgConnection, product_id: Uuid, quantity: i32) -> Result<i32, ServiceError> {
    let product = lock(&mut *conn, product_id).await?;
    let restored = stock_after_release(product.stock_quantity, quantity)?;

    let stored = productdb::set_stock_quantity(&mut *conn, product_id, product.stock_quantity, restored)
        .await?
        .ok_or(ServiceError::Busy)?;

    tracing::debug!(
        "Released {} of product {}: stock {} -> {}",
        quantity, product_id, product.stock_quantity, stored
    );
    Ok(stored)
}

/// Counts a completed deal towards the product's sales.
pub async fn record_sale(conn: &mut PgConnection, product_id: Uuid, quantity: i32) -> Result<i32, ServiceError> {
    lock(&mut *conn, product_id).await?;
    let total_sales = productdb::add_total_sales(&mut *conn, product_id, quantity).await?;

    tracing::debug!("Product {} total sales now {}", product_id, total_sales);
    Ok(total_sales)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_within_stock() {
        assert_eq!(remaining_after_reserve(100, 20).unwrap(), 80);
        assert_eq!(remaining_after_reserve(20, 20).unwrap(), 0);
    }

    #[test]
    fn test_reserve_beyond_stock_reports_available() {
        match remaining_after_reserve(15, 20) {
            Err(ServiceError::InsufficientStock { requested, available }) => {
                assert_eq!(requested, 20);
                assert_eq!(available, 15);
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
    }

    #[test]
    fn test_non_positive_quantity_is_a_validation_error() {
        assert_eq!(remaining_after_reserve(10, 0).unwrap_err().kind(), "validation_error");
        assert_eq!(remaining_after_reserve(10, -3).unwrap_err().kind(), "validation_error");
    }

    #[test]
    fn test_release_restores_exact_quantity() {
        let after_reserve = remaining_after_reserve(100, 20).unwrap();
        assert_eq!(stock_after_release(after_reserve, 20).unwrap(), 100);
        assert!(stock_after_release(i32::MAX, 1).is_err());
    }

    #[test]
    fn test_sequential_reservations_never_go_negative() {
        let mut stock = 50;
        let mut accepted = 0;
        for quantity in [20, 20, 20, 5] {
            if let Ok(remaining) = remaining_after_reserve(stock, quantity) {
                stock = remaining;
                accepted += quantity;
            }
        }
        assert_eq!(accepted, 45);
        assert_eq!(stock, 5);
    }
}
