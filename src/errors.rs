use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable reason code so clients can prompt corrective
    /// action (remove item, try another code, retry payment)
    pub code: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("Discount code not found: {0}")]
    DiscountNotFound(String),

    #[error("Discount code is not active: {0}")]
    DiscountInactive(String),

    #[error("Discount code is outside its validity window: {0}")]
    DiscountExpired(String),

    #[error("Discount code has reached its usage limit: {0}")]
    DiscountExhausted(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("No payment intent for reference {0}")]
    UnknownPaymentIntent(String),

    #[error("Payment intent {0} already verified")]
    AlreadyVerified(String),

    #[error("Payment not verified: {0}")]
    PaymentNotVerified(String),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Invalid order status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) | Self::UnknownPaymentIntent(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::EmptyCart | Self::InvalidStatus(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InsufficientStock(_)
            | Self::DiscountNotFound(_)
            | Self::DiscountInactive(_)
            | Self::DiscountExpired(_)
            | Self::DiscountExhausted(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyVerified(_) => StatusCode::CONFLICT,
            Self::PaymentNotVerified(_) => StatusCode::PAYMENT_REQUIRED,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
        }
    }

    /// Stable machine-readable code per variant.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::EmptyCart => "empty_cart",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::DiscountNotFound(_) => "discount_not_found",
            Self::DiscountInactive(_) => "discount_inactive",
            Self::DiscountExpired(_) => "discount_expired",
            Self::DiscountExhausted(_) => "discount_exhausted",
            Self::InvalidSignature => "invalid_signature",
            Self::UnknownPaymentIntent(_) => "unknown_payment_intent",
            Self::AlreadyVerified(_) => "already_verified",
            Self::PaymentNotVerified(_) => "payment_not_verified",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidStatus(_) => "invalid_status",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) => "internal_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// Message suitable for HTTP responses. Internal errors return a
    /// generic message to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.reason_code().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
