use crate::{
    entities::{
        cart,
        customer::Entity as CustomerEntity,
        order::{self, Entity as OrderEntity},
        order_item,
        payment_intent,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::NotificationDispatcher,
    services::{
        carts::CartService,
        catalog::Catalog,
        discounts::{DiscountQuote, DiscountService},
        inventory::{InventoryService, LineDemand, LowStock},
        order_status::OrderStatus,
        payments::{PaymentService, VerifiedPayment},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const PAYMENT_STATUS_PENDING: &str = "pending";
pub const PAYMENT_STATUS_PAID: &str = "paid";

/// Address snapshot captured onto the order as an immutable copy.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    pub city: String,
    pub province: String,
    pub country_code: String,
    pub postal_code: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DirectOrderRequest {
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub discount_code: Option<String>,
}

/// Cart line joined with its catalog snapshot.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub customization: Option<serde_json::Value>,
}

/// Totals for the customer's current cart, used to size payment
/// intents before checkout.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutQuote {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
}

struct CommitPlan {
    cart: cart::Model,
    lines: Vec<PricedLine>,
    discount: Option<DiscountQuote>,
    total: Decimal,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    payment: Option<payment_intent::Model>,
}

/// Order materializer: converts cart state into a persisted order in
/// one all-or-nothing transaction.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    carts: CartService,
    discounts: DiscountService,
    inventory: InventoryService,
    payments: PaymentService,
    catalog: Arc<dyn Catalog>,
    event_sender: EventSender,
    dispatcher: NotificationDispatcher,
    currency: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: CartService,
        discounts: DiscountService,
        inventory: InventoryService,
        payments: PaymentService,
        catalog: Arc<dyn Catalog>,
        event_sender: EventSender,
        dispatcher: NotificationDispatcher,
        currency: String,
    ) -> Self {
        Self {
            db,
            carts,
            discounts,
            inventory,
            payments,
            catalog,
            event_sender,
            dispatcher,
            currency,
        }
    }

    /// Prices the customer's current cart without mutating anything.
    /// Payment intents are created against this total.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn quote(
        &self,
        customer_id: Uuid,
        discount_code: Option<&str>,
    ) -> Result<CheckoutQuote, ServiceError> {
        let (_, lines) = self.price_cart(customer_id).await?;
        let subtotal = subtotal_of(&lines);
        let discount = match discount_code {
            Some(code) => Some(self.discounts.validate(code, subtotal).await?),
            None => None,
        };
        let discount_amount = discount
            .as_ref()
            .map(|d| d.discount_amount)
            .unwrap_or(Decimal::ZERO);
        Ok(CheckoutQuote {
            subtotal,
            discount_amount,
            total: subtotal - discount_amount,
            currency: self.currency.clone(),
        })
    }

    /// Direct (e.g. cash-on-delivery) checkout: validates stock and
    /// discount, computes the total, and commits. Payment remains
    /// `pending`.
    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn create_direct_order(
        &self,
        customer_id: Uuid,
        request: DirectOrderRequest,
    ) -> Result<order::Model, ServiceError> {
        let (cart, lines) = self.price_cart(customer_id).await?;
        self.inventory.check_available(&demands_of(&lines)).await?;

        let subtotal = subtotal_of(&lines);
        let discount = match request.discount_code.as_deref() {
            Some(code) => Some(self.discounts.validate(code, subtotal).await?),
            None => None,
        };
        let total = discount
            .as_ref()
            .map(|d| d.final_total)
            .unwrap_or(subtotal);

        self.commit(
            customer_id,
            CommitPlan {
                cart,
                lines,
                discount,
                total,
                shipping_address: Some(request.shipping_address),
                billing_address: request.billing_address,
                payment: None,
            },
        )
        .await
    }

    /// Payment-verified checkout: same computation as the direct path,
    /// with the intent's `created -> verified` flip folded into the
    /// commit transaction and the order marked `paid`.
    ///
    /// Inventory or discount failures discovered here are terminal for
    /// the checkout attempt; refunds are an operational concern outside
    /// this pipeline.
    #[instrument(skip(self, verified), fields(external_ref = %verified.intent.external_ref))]
    pub async fn create_order_from_payment(
        &self,
        verified: VerifiedPayment,
        discount_code: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        if verified.callback.status != "succeeded" {
            self.payments.mark_failed(&*self.db, &verified.intent).await?;
            return Err(ServiceError::PaymentNotVerified(format!(
                "gateway reported status '{}'",
                verified.callback.status
            )));
        }

        let customer_id = verified.intent.customer_id;
        let (cart, lines) = self.price_cart(customer_id).await?;
        self.inventory.check_available(&demands_of(&lines)).await?;

        let subtotal = subtotal_of(&lines);
        let discount = match discount_code.as_deref() {
            Some(code) => Some(self.discounts.validate(code, subtotal).await?),
            None => None,
        };
        let total = discount
            .as_ref()
            .map(|d| d.final_total)
            .unwrap_or(subtotal);

        if verified.intent.amount < total {
            return Err(ServiceError::PaymentNotVerified(format!(
                "authorized amount {} does not cover order total {}",
                verified.intent.amount, total
            )));
        }
        if verified.intent.currency != self.currency {
            return Err(ServiceError::PaymentNotVerified(format!(
                "authorized currency {} does not match order currency {}",
                verified.intent.currency, self.currency
            )));
        }

        self.commit(
            customer_id,
            CommitPlan {
                cart,
                lines,
                discount,
                total,
                shipping_address: verified.callback.shipping_address.clone(),
                billing_address: verified.callback.billing_address.clone(),
                payment: Some(verified.intent),
            },
        )
        .await
    }

    /// Loads the cart and joins each line with its catalog snapshot.
    async fn price_cart(
        &self,
        customer_id: Uuid,
    ) -> Result<(cart::Model, Vec<PricedLine>), ServiceError> {
        let (cart, items) = self.carts.get_cart_with_items(customer_id).await?;
        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let info = self
                .catalog
                .product(item.product_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Product {}", item.product_id)))?;
            if !info.active {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} is not available",
                    item.product_id
                )));
            }
            let total_price = info.unit_price * Decimal::from(item.quantity);
            lines.push(PricedLine {
                product_id: item.product_id,
                product_name: info.name,
                quantity: item.quantity,
                unit_price: info.unit_price,
                total_price,
                customization: item.customization,
            });
        }
        Ok((cart, lines))
    }

    /// The commit step: one transaction covering inventory decrement,
    /// discount redemption, order + line insertion, cart clearing, and
    /// (payment path) the intent status flip. Any failure rolls the
    /// whole transaction back; events and notifications only fire after
    /// the commit lands.
    async fn commit(
        &self,
        customer_id: Uuid,
        plan: CommitPlan,
    ) -> Result<order::Model, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let demands = demands_of(&plan.lines);

        let txn = self.db.begin().await?;

        self.inventory.reserve_and_decrement(&txn, &demands).await?;

        if let Some(quote) = &plan.discount {
            self.discounts.redeem(&txn, &quote.code).await?;
        }

        let low_stock: Vec<LowStock> = self
            .inventory
            .check_low_stock(&txn, &demands.iter().map(|d| d.product_id).collect::<Vec<_>>())
            .await?;

        let payment_status = if plan.payment.is_some() {
            PAYMENT_STATUS_PAID
        } else {
            PAYMENT_STATUS_PENDING
        };

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number_for(order_id)),
            customer_id: Set(customer_id),
            status: Set(OrderStatus::Pending.to_string()),
            payment_status: Set(payment_status.to_string()),
            total_amount: Set(plan.total),
            currency: Set(self.currency.clone()),
            discount_code: Set(plan.discount.as_ref().map(|d| d.code.clone())),
            discount_amount: Set(plan.discount.as_ref().map(|d| d.discount_amount)),
            shipping_address: Set(plan
                .shipping_address
                .as_ref()
                .and_then(|a| serde_json::to_value(a).ok())),
            billing_address: Set(plan
                .billing_address
                .as_ref()
                .and_then(|a| serde_json::to_value(a).ok())),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        for line in &plan.lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.total_price),
                customization: Set(line.customization.clone()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        self.carts.clear(&txn, plan.cart.id).await?;

        if let Some(intent) = &plan.payment {
            self.payments.mark_verified(&txn, intent).await?;
        }

        txn.commit().await?;

        info!(
            order_id = %order_id,
            customer_id = %customer_id,
            total = %plan.total,
            paid = plan.payment.is_some(),
            "Order created"
        );

        self.event_sender.send_logged(Event::OrderCreated(order_id)).await;
        if let Some(quote) = &plan.discount {
            self.event_sender
                .send_logged(Event::DiscountRedeemed {
                    code: quote.code.clone(),
                    order_id,
                })
                .await;
        }
        if let Some(intent) = &plan.payment {
            self.event_sender
                .send_logged(Event::PaymentVerified {
                    intent_id: intent.id,
                    order_id,
                })
                .await;
        }
        for item in low_stock {
            self.event_sender
                .send_logged(Event::LowStockDetected {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    threshold: item.threshold,
                })
                .await;
        }

        self.notify_created(&order_model).await;
        Ok(order_model)
    }

    async fn notify_created(&self, order: &order::Model) {
        match CustomerEntity::find_by_id(order.customer_id)
            .one(&*self.db)
            .await
        {
            Ok(Some(customer)) => self.dispatcher.dispatch_status_change(
                order.id,
                customer.email,
                customer.name,
                order.status.clone(),
            ),
            Ok(None) => {
                warn!(order_id = %order.id, "No customer found for order confirmation")
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Failed to load confirmation recipient")
            }
        }
    }

    /// Fetches an order with its lines.
    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<(order::Model, Vec<order_item::Model>)>, ServiceError> {
        let Some(order) = OrderEntity::find_by_id(order_id).one(&*self.db).await? else {
            return Ok(None);
        };
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(Some((order, items)))
    }
}

fn subtotal_of(lines: &[PricedLine]) -> Decimal {
    lines.iter().map(|l| l.total_price).sum()
}

fn demands_of(lines: &[PricedLine]) -> Vec<LineDemand> {
    lines
        .iter()
        .map(|l| LineDemand {
            product_id: l.product_id,
            quantity: l.quantity,
        })
        .collect()
}

fn order_number_for(order_id: Uuid) -> String {
    let hex = order_id.simple().to_string();
    format!("ORD-{}", hex[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, unit_price: Decimal) -> PricedLine {
        PricedLine {
            product_id: Uuid::new_v4(),
            product_name: "widget".into(),
            quantity,
            unit_price,
            total_price: unit_price * Decimal::from(quantity),
            customization: None,
        }
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let lines = vec![line(2, dec!(10.00)), line(1, dec!(5.50))];
        assert_eq!(subtotal_of(&lines), dec!(25.50));
    }

    #[test]
    fn order_numbers_are_prefixed_and_short() {
        let n = order_number_for(Uuid::new_v4());
        assert!(n.starts_with("ORD-"));
        assert_eq!(n.len(), 12);
    }

    #[test]
    fn demands_mirror_lines() {
        let lines = vec![line(2, dec!(10.00)), line(3, dec!(1.00))];
        let demands = demands_of(&lines);
        assert_eq!(demands.len(), 2);
        assert_eq!(demands[0].quantity, 2);
        assert_eq!(demands[1].quantity, 3);
    }
}
