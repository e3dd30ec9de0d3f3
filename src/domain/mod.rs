//! Domain model: orders, carts, payments, refunds, history.
pub mod cart;
pub mod catalog;
pub mod history;
pub mod order;
pub mod payment;
pub mod refund;

pub use cart::{Cart, CartItem};
pub use catalog::{Product, User};
pub use history::OrderHistory;
pub use order::{LineItem, Order, OrderStatus};
pub use payment::{mask_card, validate_instrument, Payment};
pub use refund::{RefundItem, RefundRequest, RefundResolution};
