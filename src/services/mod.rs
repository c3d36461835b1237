pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod discounts;
pub mod inventory;
pub mod order_status;
pub mod payments;
