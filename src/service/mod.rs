//! The workflow core: cart snapshotting, the order state machine, payment
//! settlement, order history, and the refund workflow. Controllers stay
//! thin; everything with an invariant lives here or in `domain`.

pub mod orders;
pub mod payments;
pub mod refunds;

use std::sync::Arc;

use crate::domain::{Cart, CartItem};
use crate::error::{CommerceError, Result};
use crate::events::EventPublisher;
use crate::invoice::InvoiceService;
use crate::store::Stores;

pub use orders::PreviousOrders;
pub use payments::{InvoiceOutcome, SettlementOutcome, StockShortfall};
pub use refunds::RefundLine;

pub struct CommerceService {
    pub stores: Stores,
    pub(crate) invoice: Arc<dyn InvoiceService>,
    pub(crate) events: EventPublisher,
}

impl CommerceService {
    pub fn new(stores: Stores, invoice: Arc<dyn InvoiceService>, events: EventPublisher) -> Self {
        Self {
            stores,
            invoice,
            events,
        }
    }

    /// The user's active cart; created empty on first touch.
    pub async fn get_cart(&self, user_id: &str) -> Result<Cart> {
        if let Some(cart) = self.stores.carts.find_active_for_user(user_id).await? {
            return Ok(cart);
        }
        let cart = Cart::for_user(user_id);
        self.stores.carts.upsert(&cart).await?;
        Ok(cart)
    }

    /// Add a product to the user's cart, capturing the unit price at add
    /// time. The frozen price is what the order snapshot will carry.
    pub async fn add_to_cart(&self, user_id: &str, product_id: &str, quantity: u32) -> Result<Cart> {
        if quantity == 0 {
            return Err(CommerceError::validation("Quantity must be at least 1"));
        }
        let product = self
            .stores
            .products
            .get(product_id)
            .await?
            .ok_or_else(|| CommerceError::ProductNotFound(product_id.to_string()))?;
        let mut cart = self.get_cart(user_id).await?;
        cart.add_item(CartItem {
            product_id: product.id,
            name: product.name,
            quantity,
            unit_price: product.price,
        });
        self.stores.carts.upsert(&cart).await?;
        Ok(cart)
    }
}
