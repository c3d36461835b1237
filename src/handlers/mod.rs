pub mod carts;
pub mod checkout;
mod identity;
pub mod orders;

pub use identity::{Identity, Role};

use crate::services::{
    carts::CartService, checkout::CheckoutService, order_status::OrderStatusService,
    payments::PaymentService,
};

/// Service bundle shared through the axum state.
#[derive(Clone)]
pub struct AppServices {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub order_status: OrderStatusService,
}
