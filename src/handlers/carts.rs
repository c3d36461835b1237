use crate::{
    entities::cart_item,
    errors::ServiceError,
    handlers::Identity,
    services::carts::AddItemRequest,
    AppState,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub customization: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub items: Vec<CartLineResponse>,
}

impl From<cart_item::Model> for CartLineResponse {
    fn from(model: cart_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            quantity: model.quantity,
            customization: model.customization,
            created_at: model.created_at,
        }
    }
}

/// POST /api/v1/cart/items
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 201, description = "Line added", body = CartLineResponse),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing identity", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartLineResponse>), ServiceError> {
    let item = state.services.carts.add_item(identity.id, request).await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// GET /api/v1/cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Current cart", body = CartResponse),
        (status = 401, description = "Missing identity", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<CartResponse>, ServiceError> {
    let (cart, items) = state
        .services
        .carts
        .get_cart_with_items(identity.id)
        .await?;
    Ok(Json(CartResponse {
        id: cart.id,
        customer_id: cart.customer_id,
        items: items.into_iter().map(Into::into).collect(),
    }))
}
