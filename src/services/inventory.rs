use crate::{
    entities::inventory_item::{self, Entity as InventoryItemEntity},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// One order line's demand against inventory.
#[derive(Debug, Clone, Copy)]
pub struct LineDemand {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// A product that fell to or below its low-stock threshold during a
/// decrement. Reported back to the caller for post-commit events.
#[derive(Debug, Clone, Copy)]
pub struct LowStock {
    pub product_id: Uuid,
    pub quantity: i32,
    pub threshold: i32,
}

/// Inventory adjuster: oversell-safe stock decrements.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Decrements stock for each line with a conditional update:
    /// the row only changes while `allow_backorder` is set or
    /// `quantity >= demand`. The first line that cannot be satisfied
    /// fails with `InsufficientStock`, aborting the caller's
    /// transaction so no partial decrement persists.
    pub async fn reserve_and_decrement<C: ConnectionTrait>(
        &self,
        conn: &C,
        lines: &[LineDemand],
    ) -> Result<(), ServiceError> {
        for line in lines {
            let result = InventoryItemEntity::update_many()
                .col_expr(
                    inventory_item::Column::Quantity,
                    Expr::col(inventory_item::Column::Quantity).sub(line.quantity),
                )
                .col_expr(
                    inventory_item::Column::UpdatedAt,
                    Expr::value(Utc::now()),
                )
                .filter(inventory_item::Column::ProductId.eq(line.product_id))
                .filter(
                    Condition::any()
                        .add(inventory_item::Column::AllowBackorder.eq(true))
                        .add(inventory_item::Column::Quantity.gte(line.quantity)),
                )
                .exec(conn)
                .await?;

            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(line.product_id));
            }
        }
        Ok(())
    }

    /// Reports lines that are at or below their threshold. Called on
    /// the transaction connection right after a decrement; the caller
    /// emits events only after the transaction commits.
    pub async fn check_low_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_ids: &[Uuid],
    ) -> Result<Vec<LowStock>, ServiceError> {
        let items = InventoryItemEntity::find()
            .filter(inventory_item::Column::ProductId.is_in(product_ids.to_vec()))
            .all(conn)
            .await?;

        Ok(items
            .into_iter()
            .filter(|item| item.quantity <= item.low_stock_threshold)
            .map(|item| LowStock {
                product_id: item.product_id,
                quantity: item.quantity,
                threshold: item.low_stock_threshold,
            })
            .collect())
    }

    /// Advisory availability pre-check used before entering the commit
    /// transaction. The conditional decrement remains the authority.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn check_available(&self, lines: &[LineDemand]) -> Result<(), ServiceError> {
        for line in lines {
            let item = self.get_stock(line.product_id).await?;
            match item {
                Some(item) if item.allow_backorder || item.quantity >= line.quantity => {}
                _ => return Err(ServiceError::InsufficientStock(line.product_id)),
            }
        }
        Ok(())
    }

    /// Fetches the stock record for a product.
    pub async fn get_stock(
        &self,
        product_id: Uuid,
    ) -> Result<Option<inventory_item::Model>, ServiceError> {
        Ok(InventoryItemEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?)
    }

    /// Creates or replaces a stock record (receiving, admin).
    pub async fn set_stock(
        &self,
        product_id: Uuid,
        quantity: i32,
        low_stock_threshold: i32,
        allow_backorder: bool,
    ) -> Result<inventory_item::Model, ServiceError> {
        let existing = InventoryItemEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?;

        let model = match existing {
            Some(current) => {
                let mut active: inventory_item::ActiveModel = current.into();
                active.quantity = Set(quantity);
                active.low_stock_threshold = Set(low_stock_threshold);
                active.allow_backorder = Set(allow_backorder);
                active.updated_at = Set(Some(Utc::now()));
                active.update(&*self.db).await?
            }
            None => {
                let active = inventory_item::ActiveModel {
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    low_stock_threshold: Set(low_stock_threshold),
                    allow_backorder: Set(allow_backorder),
                    updated_at: Set(Some(Utc::now())),
                };
                active.insert(&*self.db).await?
            }
        };
        Ok(model)
    }
}
