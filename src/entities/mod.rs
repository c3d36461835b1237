pub mod cart;
pub mod cart_item;
pub mod customer;
pub mod discount_code;
pub mod inventory_item;
pub mod order;
pub mod order_item;
pub mod payment_intent;
