use crate::{
    entities::{
        customer::Entity as CustomerEntity,
        order::{self, Entity as OrderEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::NotificationDispatcher,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order lifecycle. Forward chain only, with `cancelled` reachable from
/// any non-terminal state; `delivered` and `cancelled` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    InProduction,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Strict transition table. Repeating the current status is treated
    /// as a no-op rather than an error.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        if next == Self::Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::InProduction)
                | (Self::InProduction, Self::Shipped)
                | (Self::Shipped, Self::Delivered)
        )
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkTransitionResult {
    pub updated_count: u64,
}

/// Order status machine with asynchronous notification side-effects.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    dispatcher: NotificationDispatcher,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            db,
            event_sender,
            dispatcher,
        }
    }

    /// Transitions a single order, enforcing the transition table, then
    /// notifies the customer asynchronously. Notification failures are
    /// logged by the dispatcher and never reach the caller.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let current = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = OrderStatus::from_str(&current.status)
            .map_err(|_| ServiceError::InvalidStatus(current.status.clone()))?;

        if old_status == new_status {
            txn.commit().await?;
            return Ok(current);
        }

        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        let version = current.version;
        let mut active: order::ActiveModel = current.into();
        active.status = Set(new_status.to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %new_status,
            "Order status updated"
        );
        self.event_sender
            .send_logged(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;

        self.notify(&updated, new_status).await;
        Ok(updated)
    }

    /// Applies one status to a batch with a single atomic update, then
    /// fires one independent notification per affected order. A failing
    /// notifier never affects other recipients or the reported count.
    #[instrument(skip(self, order_ids), fields(count = order_ids.len(), new_status = %new_status))]
    pub async fn bulk_transition(
        &self,
        order_ids: Vec<Uuid>,
        new_status: OrderStatus,
    ) -> Result<BulkTransitionResult, ServiceError> {
        if order_ids.is_empty() {
            return Ok(BulkTransitionResult { updated_count: 0 });
        }

        // Snapshot recipients and prior statuses before the update.
        let affected = OrderEntity::find()
            .filter(order::Column::Id.is_in(order_ids.clone()))
            .find_also_related(CustomerEntity)
            .all(&*self.db)
            .await?;

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.is_in(order_ids))
            .exec(&*self.db)
            .await?;

        info!(
            updated_count = result.rows_affected,
            new_status = %new_status,
            "Bulk order status update applied"
        );

        for (order, customer) in affected {
            self.event_sender
                .send_logged(Event::OrderStatusChanged {
                    order_id: order.id,
                    old_status: order.status.clone(),
                    new_status: new_status.to_string(),
                })
                .await;
            match customer {
                Some(customer) => self.dispatcher.dispatch_status_change(
                    order.id,
                    customer.email,
                    customer.name,
                    new_status.to_string(),
                ),
                None => warn!(order_id = %order.id, "No customer found for status notification"),
            }
        }

        Ok(BulkTransitionResult {
            updated_count: result.rows_affected,
        })
    }

    async fn notify(&self, order: &order::Model, new_status: OrderStatus) {
        match CustomerEntity::find_by_id(order.customer_id)
            .one(&*self.db)
            .await
        {
            Ok(Some(customer)) => self.dispatcher.dispatch_status_change(
                order.id,
                customer.email,
                customer.name,
                new_status.to_string(),
            ),
            Ok(None) => {
                warn!(order_id = %order.id, "No customer found for status notification")
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Failed to load notification recipient")
            }
        }
    }
}
