use crate::{
    entities::{
        cart::{self, Entity as CartEntity},
        cart_item::{self, Entity as CartItemEntity},
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Opaque customization payload snapshotted onto the order line
    pub customization: Option<serde_json::Value>,
}

/// Cart store: per-customer line items feeding checkout.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetches the customer's cart, creating it on first use.
    pub async fn get_or_create_cart(&self, customer_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = CartEntity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let model = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await?;
        Ok(model)
    }

    /// Adds a line to the customer's cart. A line with the same product
    /// and identical customization merges quantities instead of
    /// duplicating.
    #[instrument(skip(self, request), fields(customer_id = %customer_id, product_id = %request.product_id))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        request: AddItemRequest,
    ) -> Result<cart_item::Model, ServiceError> {
        request.validate()?;

        let cart = self.get_or_create_cart(customer_id).await?;

        let existing = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(request.product_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .find(|item| item.customization == request.customization);

        let model = match existing {
            Some(item) => {
                let merged = item.quantity + request.quantity;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(merged);
                active.update(&*self.db).await?
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(request.product_id),
                    quantity: Set(request.quantity),
                    customization: Set(request.customization),
                    created_at: Set(Utc::now()),
                }
                .insert(&*self.db)
                .await?
            }
        };

        let mut cart_update: cart::ActiveModel = cart.into();
        cart_update.updated_at = Set(Some(Utc::now()));
        cart_update.update(&*self.db).await?;

        Ok(model)
    }

    /// Returns the cart and its lines in insertion order.
    pub async fn get_cart_with_items(
        &self,
        customer_id: Uuid,
    ) -> Result<(cart::Model, Vec<cart_item::Model>), ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let items = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok((cart, items))
    }

    /// Removes every line from the cart. Runs on the caller's
    /// connection so checkout can clear atomically with order creation.
    pub async fn clear<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItemEntity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;
        Ok(())
    }
}
