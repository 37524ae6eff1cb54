use std::fmt;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<i32>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::to_string(&self).map_err(|_| fmt::Error)?)
    }
}

#[derive(Debug, PartialEq)]
pub enum ErrorMessage {
    ServerError,
    InvalidToken,
    TokenNotProvided,
    UserNoLongerExist,
}

impl ToString for ErrorMessage {
    fn to_string(&self) -> String {
        self.to_str().to_owned()
    }
}

impl ErrorMessage {
    fn to_str(&self) -> String {
        match self {
            ErrorMessage::ServerError => "Server Error. Please try again later".to_string(),
            ErrorMessage::InvalidToken => "Authentication token is invalid or expired".to_string(),
            ErrorMessage::TokenNotProvided => "You are not logged in, please provide a token".to_string(),
            ErrorMessage::UserNoLongerExist => "User belonging to this token no longer exists".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpError {
    pub message: String,
    pub status: StatusCode,
    pub kind: Option<&'static str>,
    pub available: Option<i32>,
}

impl HttpError {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        HttpError {
            message: message.into(),
            status,
            kind: None,
            available: None,
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::UNAUTHORIZED)
    }

    /// Tags the error with a machine-checkable kind for API clients.
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_available(mut self, available: i32) -> Self {
        self.available = Some(available);
        self
    }

    pub fn into_http_response(self) -> Response {
        let json_response = Json(ErrorResponse {
            status: "fail".to_string(),
            kind: self.kind.map(|kind| kind.to_string()),
            message: self.message.clone(),
            available: self.available,
        });

        (self.status, json_response).into_response()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HttpError: message: {}, status: {}",
            self.message, self.status
        )
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_http_response()
    }
}

// Malformed bodies, queries and path ids are client input errors like any failed validation.
impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection {
            JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        };
        HttpError::new(rejection.body_text(), status).with_kind("validation_error")
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        HttpError::bad_request(rejection.body_text()).with_kind("validation_error")
    }
}

impl From<PathRejection> for HttpError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(_) => {
                HttpError::bad_request(rejection.body_text()).with_kind("validation_error")
            }
            _ => {
                tracing::error!("Route is missing path parameters: {}", rejection.body_text());
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::{Path, Query}, http::Request, routing::get, Router};
    use axum_extra::extract::WithRejection;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn id_router() -> Router {
        Router::new().route(
            "/items/:id",
            get(|WithRejection(Path(id), _): WithRejection<Path<Uuid>, HttpError>| async move {
                id.to_string()
            }),
        )
    }

    #[derive(serde::Deserialize)]
    struct Page {
        page: i64,
    }

    #[tokio::test]
    async fn test_malformed_path_id_is_a_validation_error() {
        let response = id_router()
            .oneshot(Request::builder().uri("/items/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(body["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_malformed_query_is_a_validation_error() {
        let app = Router::new().route(
            "/items",
            get(|WithRejection(Query(page), _): WithRejection<Query<Page>, HttpError>| async move {
                page.page.to_string()
            }),
        );

        let response = app
            .oneshot(Request::builder().uri("/items?page=first").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(response).await["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_error_body_carries_kind_and_available() {
        let response = HttpError::new("Only 3 left", StatusCode::CONFLICT)
            .with_kind("insufficient_stock")
            .with_available(3)
            .into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["kind"], "insufficient_stock");
        assert_eq!(body["available"], 3);
    }

    #[tokio::test]
    async fn test_plain_error_omits_optional_fields() {
        let response = HttpError::bad_request("Quantity must be greater than zero").into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("kind").is_none());
        assert!(body.get("available").is_none());
        assert_eq!(body["message"], "Quantity must be greater than zero");
    }
}
