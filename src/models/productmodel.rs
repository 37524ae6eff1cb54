// models/productmodel.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::decimal::to_money;

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub unit: String,
    pub stock_quantity: i32,
    pub location: String,
    pub is_active: bool,
    pub total_sales: i32,
    pub average_rating: BigDecimal,
    pub rating_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn stock_status(&self) -> String {
        if !self.is_active {
            "Unavailable".to_string()
        } else if self.stock_quantity == 0 {
            "Out of Stock".to_string()
        } else if self.stock_quantity < 10 {
            format!("Low Stock ({} {} left)", self.stock_quantity, self.unit)
        } else {
            format!("In Stock ({} {} available)", self.stock_quantity, self.unit)
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    #[serde(with = "crate::utils::decimal::fixed")]
    pub price: BigDecimal,
    pub stock_status: String,
}

impl From<&Product> for ProductSummary {
    fn from(product: &Product) -> Self {
        ProductSummary {
            id: product.id,
            name: product.name.clone(),
            unit: product.unit.clone(),
            price: to_money(&product.price),
            stock_status: product.stock_status(),
        }
    }
}
