//! Mapping of service errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::EcommerceError;

#[derive(Debug)]
pub enum ApiError {
    Domain(EcommerceError),
    Unauthorized,
    Forbidden,
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Domain(e) => match e {
                EcommerceError::ProductNotFound
                | EcommerceError::CartNotFound
                | EcommerceError::LineNotFound
                | EcommerceError::AddressNotFound
                | EcommerceError::OrderNotFound
                | EcommerceError::DeliveryRuleNotFound => StatusCode::NOT_FOUND,
                EcommerceError::ProductUnavailable
                | EcommerceError::EmptyCart
                | EcommerceError::InvalidPaymentMethod(_)
                | EcommerceError::Validation(_) => StatusCode::BAD_REQUEST,
                EcommerceError::InvalidStatusTransition { .. } | EcommerceError::ConcurrencyConflict => {
                    StatusCode::CONFLICT
                }
                EcommerceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Domain(e) => e.code(),
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::BadRequest(_) => "validation_error",
        }
    }
}

impl From<EcommerceError> for ApiError {
    fn from(e: EcommerceError) -> Self { Self::Domain(e) }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self { Self::BadRequest(e.to_string()) }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            _ if status.is_server_error() => {
                tracing::error!(error = ?self, "request failed");
                "Internal server error".to_string()
            }
            Self::Domain(e) => e.to_string(),
            Self::Unauthorized => "Authentication required".to_string(),
            Self::Forbidden => "Not allowed".to_string(),
            Self::BadRequest(message) => message.clone(),
        };
        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}
