use crate::{
    entities::{order, order_item},
    errors::ServiceError,
    handlers::Identity,
    services::order_status::{BulkTransitionResult, OrderStatus},
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub customization: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub discount_code: Option<String>,
    pub discount_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderLineResponse>,
}

impl OrderResponse {
    pub fn from_parts(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            customer_id: order.customer_id,
            status: order.status,
            payment_status: order.payment_status,
            total_amount: order.total_amount,
            currency: order.currency,
            discount_code: order.discount_code,
            discount_amount: order.discount_amount,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderLineResponse {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                    customization: item.customization,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkTransitionRequest {
    pub order_ids: Vec<Uuid>,
    pub status: OrderStatus,
}

/// GET /api/v1/orders/{id}
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = OrderResponse),
        (status = 403, description = "Not the order's owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    identity: Identity,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let (order, items) = state
        .services
        .checkout
        .get_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    if order.customer_id != identity.id && !identity.is_staff() {
        return Err(ServiceError::Forbidden(
            "order belongs to another customer".to_string(),
        ));
    }

    Ok(Json(OrderResponse::from_parts(order, items)))
}

/// POST /api/v1/orders/{id}/status
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Updated order", body = OrderResponse),
        (status = 403, description = "Staff role required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn transition_status(
    State(state): State<AppState>,
    identity: Identity,
    Path(order_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    identity.require_staff()?;
    let order = state
        .services
        .order_status
        .transition(order_id, request.status)
        .await?;
    Ok(Json(OrderResponse::from_parts(order, Vec::new())))
}

/// POST /api/v1/orders/status/bulk
#[utoipa::path(
    post,
    path = "/api/v1/orders/status/bulk",
    request_body = BulkTransitionRequest,
    responses(
        (status = 200, description = "Number of orders updated", body = BulkTransitionResult),
        (status = 403, description = "Staff role required", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn bulk_transition_status(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<BulkTransitionRequest>,
) -> Result<Json<BulkTransitionResult>, ServiceError> {
    identity.require_staff()?;
    let result = state
        .services
        .order_status
        .bulk_transition(request.order_ids, request.status)
        .await?;
    Ok(Json(result))
}
