use thiserror::Error;
use uuid::Uuid;
use crate::{
    models::dealmodels::DealStatus,
    error::HttpError,
};
use axum::http::StatusCode;

/// SQLSTATE raised when `lock_timeout` expires while waiting on a row lock.
const LOCK_NOT_AVAILABLE: &str = "55P03";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Forbidden(String),

    #[error("Deal {0} is {1:?}; {2}")]
    InvalidState(Uuid, DealStatus, String),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },

    #[error("Conversation {0} has no other participant to trade with")]
    NoCounterparty(Uuid),

    #[error("Deal {0} has already been reviewed")]
    AlreadyReviewed(Uuid),

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i32),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Another change to this record is in progress, please retry")]
    Busy,

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        let code = error
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned());

        match code.as_deref() {
            Some(LOCK_NOT_AVAILABLE) => ServiceError::Busy,
            _ => ServiceError::Database(error),
        }
    }
}

impl ServiceError {
    pub fn is_unique_violation(error: &sqlx::Error) -> bool {
        error
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code == UNIQUE_VIOLATION)
            .unwrap_or(false)
    }

    /// Machine-checkable error kind surfaced to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::InvalidState(..) => "invalid_state",
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::NoCounterparty(_) => "no_counterparty",
            ServiceError::AlreadyReviewed(_) => "already_reviewed",
            ServiceError::InvalidRating(_) => "invalid_rating",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Busy => "busy",
            ServiceError::Database(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,

            ServiceError::InvalidState(..)
            | ServiceError::InsufficientStock { .. }
            | ServiceError::AlreadyReviewed(_)
            | ServiceError::Busy => StatusCode::CONFLICT,

            ServiceError::NoCounterparty(_) => StatusCode::UNPROCESSABLE_ENTITY,

            ServiceError::InvalidRating(_)
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        let kind = error.kind();

        let message = match &error {
            ServiceError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Server Error. Please try again later".to_string()
            }
            _ => error.to_string(),
        };

        let http_error = HttpError::new(message, status).with_kind(kind);

        match error {
            ServiceError::InsufficientStock { available, .. } => http_error.with_available(available),
            _ => http_error,
        }
    }
}
