use crate::{
    errors::ServiceError,
    handlers::{orders::OrderResponse, Identity},
    services::checkout::DirectOrderRequest,
    AppState,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    /// Discount code applied when sizing the intent
    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IntentResponse {
    pub external_ref: String,
    pub amount: Decimal,
    pub currency: String,
    /// Gateway-specific payload the client hands to the gateway SDK
    pub client_payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    pub discount_code: Option<String>,
}

/// POST /api/v1/checkout/intents
///
/// Prices the caller's current cart and reserves a payment intent with
/// the external gateway for that amount.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/intents",
    request_body = CreateIntentRequest,
    responses(
        (status = 201, description = "Intent reserved", body = IntentResponse),
        (status = 400, description = "Empty cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Discount rejected", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_intent(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<IntentResponse>), ServiceError> {
    let quote = state
        .services
        .checkout
        .quote(identity.id, request.discount_code.as_deref())
        .await?;

    let (intent, client_payload) = state
        .services
        .payments
        .create_intent(identity.id, quote.total, &quote.currency)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IntentResponse {
            external_ref: intent.external_ref,
            amount: intent.amount,
            currency: intent.currency,
            client_payload,
        }),
    ))
}

/// POST /api/v1/checkout/orders
///
/// Direct (cash-on-delivery) checkout from the caller's cart.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders",
    request_body = DirectOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Empty cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Stock or discount rejected", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_direct_order(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<DirectOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ServiceError> {
    let order = state
        .services
        .checkout
        .create_direct_order(identity.id, request)
        .await?;

    let items = state
        .services
        .checkout
        .get_order(order.id)
        .await?
        .map(|(_, items)| items)
        .unwrap_or_default();
    Ok((
        StatusCode::CREATED,
        Json(OrderResponse::from_parts(order, items)),
    ))
}

/// POST /api/v1/checkout/webhook
///
/// Gateway completion callback: verifies the HMAC signature over the
/// raw body, then materializes the paid order. Re-delivery of an
/// already-processed callback returns 409 without creating a second
/// order.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/webhook",
    request_body = String,
    responses(
        (status = 201, description = "Order created from verified payment", body = OrderResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown payment intent", body = crate::errors::ErrorResponse),
        (status = 409, description = "Callback already processed", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Query(params): Query<WebhookParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<OrderResponse>), ServiceError> {
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::InvalidSignature)?;
    let timestamp = headers.get("x-timestamp").and_then(|v| v.to_str().ok());

    let verified = state
        .services
        .payments
        .verify_callback(&body, signature, timestamp)
        .await?;

    let order = state
        .services
        .checkout
        .create_order_from_payment(verified, params.discount_code)
        .await?;

    let items = state
        .services
        .checkout
        .get_order(order.id)
        .await?
        .map(|(_, items)| items)
        .unwrap_or_default();
    Ok((
        StatusCode::CREATED,
        Json(OrderResponse::from_parts(order, items)),
    ))
}
