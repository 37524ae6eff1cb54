// dtos/tooldtos.rs
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::utils::fair_price::FairPrice;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FairPriceDto {
    pub farmgate_price: BigDecimal,
    pub transport_cost: BigDecimal,
    pub quantity: BigDecimal,
    pub supermarket_price: Option<BigDecimal>,
}

#[derive(Debug, Serialize)]
pub struct FairPriceResponse {
    #[serde(flatten)]
    pub breakdown: FairPrice,
    #[serde(with = "crate::utils::decimal::fixed::option")]
    pub supermarket_price: Option<BigDecimal>,
    #[serde(with = "crate::utils::decimal::fixed::option")]
    pub buyer_savings_percent: Option<BigDecimal>,
}
