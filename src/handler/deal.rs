// handler/deal.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::dealdtos::*,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn deal_handler() -> Router {
    Router::new()
        .route("/:deal_id", get(get_deal))
        .route("/:deal_id/accept", post(accept_deal))
        .route("/:deal_id/decline", post(decline_deal))
        .route("/:deal_id/cancel", post(cancel_deal))
        .route("/:deal_id/complete", post(complete_deal))
        .route("/:deal_id/review", post(review_deal))
}

fn validation_error(e: validator::ValidationErrors) -> HttpError {
    HttpError::bad_request(e.to_string()).with_kind("validation_error")
}

fn deal_json(deal: DealResponse) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "success",
        "data": deal
    }))
}

pub async fn create_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
    WithRejection(Json(body), _): WithRejection<Json<CreateOfferDto>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let deal = app_state.deal_service
        .create_offer(conversation_id, &auth.user, body)
        .await?;

    Ok((StatusCode::CREATED, deal_json(deal)))
}

pub async fn list_conversation_deals(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let deals = app_state.deal_service
        .list_conversation_deals(conversation_id, auth.user.id)
        .await?;

    Ok(Json(DealListResponseDto {
        status: "success".to_string(),
        results: deals.len(),
        data: deals,
    }))
}

pub async fn get_deal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(deal_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let deal = app_state.deal_service.get_deal(deal_id, auth.user.id).await?;
    Ok(deal_json(deal))
}

pub async fn accept_deal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(deal_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let deal = app_state.deal_service.accept(deal_id, auth.user.id).await?;
    Ok(deal_json(deal))
}

pub async fn decline_deal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(deal_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let deal = app_state.deal_service.decline(deal_id, auth.user.id).await?;
    Ok(deal_json(deal))
}

pub async fn cancel_deal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(deal_id), _): WithRejection<Path<Uuid>, HttpError>,
    body: Result<Json<CancelDealDto>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    // The reason is optional, so a request without a JSON body cancels without one.
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => CancelDealDto::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    body.validate().map_err(validation_error)?;

    let deal = app_state.deal_service
        .cancel(deal_id, auth.user.id, body.reason)
        .await?;

    Ok(deal_json(deal))
}

pub async fn complete_deal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(deal_id), _): WithRejection<Path<Uuid>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    let deal = app_state.deal_service.complete(deal_id, auth.user.id).await?;
    Ok(deal_json(deal))
}

pub async fn review_deal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    WithRejection(Path(deal_id), _): WithRejection<Path<Uuid>, HttpError>,
    WithRejection(Json(body), _): WithRejection<Json<SubmitReviewDto>, HttpError>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(validation_error)?;

    let review = app_state.deal_service
        .submit_review(deal_id, auth.user.id, body)
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({
        "status": "success",
        "data": review
    }))))
}
