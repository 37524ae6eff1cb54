// handler/tools.rs
use axum::{response::IntoResponse, routing::post, Json, Router};
use axum_extra::extract::WithRejection;

use crate::{
    dtos::tooldtos::{FairPriceDto, FairPriceResponse},
    error::HttpError,
    utils::fair_price::{calculate_buyer_savings, calculate_fair_price},
};

pub fn tools_handler() -> Router {
    Router::new().route("/fair-price", post(fair_price))
}

pub async fn fair_price(
    WithRejection(Json(body), _): WithRejection<Json<FairPriceDto>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let breakdown = calculate_fair_price(&body.farmgate_price, &body.transport_cost, &body.quantity)?;

    let buyer_savings_percent = body
        .supermarket_price
        .as_ref()
        .map(|supermarket| calculate_buyer_savings(&breakdown.fair_price, supermarket));

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": FairPriceResponse {
            breakdown,
            supermarket_price: body.supermarket_price,
            buyer_savings_percent,
        }
    })))
}
