// utils/fair_price.rs
//! Fair selling price for direct-to-consumer sales.
//!
//! The farmer (or buyer) carries the logistics cost instead of a middleman, so the
//! recommended price is the farmgate price plus per-unit transport, with a fixed
//! sustainability margin on top.

use bigdecimal::BigDecimal;
use num_traits::Zero;
use serde::Serialize;

use super::decimal::BigDecimalHelpers;
use crate::service::error::ServiceError;

/// 30% margin applied on top of the break-even cost, in hundredths.
const SUSTAINABILITY_MARGIN_HUNDREDTHS: i32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FairPrice {
    #[serde(with = "crate::utils::decimal::fixed")]
    pub fair_price: BigDecimal,
    #[serde(with = "crate::utils::decimal::fixed")]
    pub unit_logistics: BigDecimal,
    #[serde(with = "crate::utils::decimal::fixed")]
    pub base_cost: BigDecimal,
    #[serde(with = "crate::utils::decimal::fixed")]
    pub profit_margin: BigDecimal,
    #[serde(with = "crate::utils::decimal::fixed")]
    pub farmgate_price: BigDecimal,
}

pub fn calculate_fair_price(
    farmgate_price: &BigDecimal,
    transport_cost: &BigDecimal,
    quantity: &BigDecimal,
) -> Result<FairPrice, ServiceError> {
    if quantity <= &BigDecimal::zero() {
        return Err(ServiceError::Validation("Quantity must be greater than zero".to_string()));
    }
    if farmgate_price < &BigDecimal::zero() || transport_cost < &BigDecimal::zero() {
        return Err(ServiceError::Validation("Prices and costs cannot be negative".to_string()));
    }

    let margin = BigDecimal::new(SUSTAINABILITY_MARGIN_HUNDREDTHS.into(), 2);

    let unit_logistics = transport_cost / quantity;
    let base_cost = farmgate_price + &unit_logistics;
    let profit_amount = &base_cost * &margin;
    let fair_price = &base_cost + &profit_amount;

    Ok(FairPrice {
        fair_price: fair_price.round_half_up(2),
        unit_logistics: unit_logistics.round_half_up(2),
        base_cost: base_cost.round_half_up(2),
        profit_margin: profit_amount.round_half_up(2),
        farmgate_price: farmgate_price.round_half_up(2),
    })
}

/// Percentage saved against a supermarket reference price, one decimal place.
/// `0.0` when our price is not cheaper.
pub fn calculate_buyer_savings(fair_price: &BigDecimal, supermarket_price: &BigDecimal) -> BigDecimal {
    if supermarket_price <= &BigDecimal::zero() || fair_price >= supermarket_price {
        return BigDecimal::zero().round_half_up(1);
    }

    let savings = (supermarket_price - fair_price) / supermarket_price * BigDecimal::from(100);
    savings.round_half_up(1)
}
