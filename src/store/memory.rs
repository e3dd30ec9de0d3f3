//! Thread-safe in-memory backend, used by the test suite and by DB-less
//! runs. Every read-modify-write happens under the collection's write
//! guard, which gives the same per-document serialization the Postgres
//! backend gets from single-statement updates.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Cart, Order, OrderHistory, OrderStatus, Payment, Product, RefundRequest, RefundResolution,
    User,
};
use crate::error::{CommerceError, Result};
use crate::store::{
    CartStore, HistoryStore, OrderStore, PaymentStore, ProductStore, RefundStore, StockDebit,
    UserStore,
};

#[derive(Default)]
pub struct MemoryStore {
    carts: RwLock<HashMap<String, Cart>>,
    products: RwLock<HashMap<String, Product>>,
    users: RwLock<HashMap<String, User>>,
    orders: RwLock<HashMap<String, Order>>,
    payments: RwLock<HashMap<String, Payment>>,
    refunds: RwLock<HashMap<String, RefundRequest>>,
    history: RwLock<HashMap<String, OrderHistory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn find_active_for_user(&self, user_id: &str) -> Result<Option<Cart>> {
        let carts = self.carts.read().expect("RwLock poisoned");
        Ok(carts.values().find(|c| c.user_id == user_id).cloned())
    }

    async fn upsert(&self, cart: &Cart) -> Result<()> {
        let mut carts = self.carts.write().expect("RwLock poisoned");
        carts.insert(cart.id.clone(), cart.clone());
        Ok(())
    }

    async fn clear_items(&self, cart_id: &str) -> Result<()> {
        let mut carts = self.carts.write().expect("RwLock poisoned");
        let cart = carts
            .get_mut(cart_id)
            .ok_or_else(|| CommerceError::CartNotFound(cart_id.to_string()))?;
        cart.clear();
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get(&self, product_id: &str) -> Result<Option<Product>> {
        let products = self.products.read().expect("RwLock poisoned");
        Ok(products.get(product_id).cloned())
    }

    async fn upsert(&self, product: &Product) -> Result<()> {
        let mut products = self.products.write().expect("RwLock poisoned");
        products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn adjust_stock(&self, product_id: &str, delta: i64) -> Result<i64> {
        let mut products = self.products.write().expect("RwLock poisoned");
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CommerceError::ProductNotFound(product_id.to_string()))?;
        let next = product.stock + delta;
        if next < 0 {
            return Err(CommerceError::validation(format!(
                "Stock for product {product_id} cannot go below zero"
            )));
        }
        product.stock = next;
        Ok(next)
    }

    async fn debit_stock_clamped(&self, product_id: &str, quantity: i64) -> Result<StockDebit> {
        let mut products = self.products.write().expect("RwLock poisoned");
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CommerceError::ProductNotFound(product_id.to_string()))?;
        let debited = quantity.min(product.stock);
        product.stock -= debited;
        Ok(StockDebit {
            debited,
            shortfall: quantity - debited,
            remaining: product.stock,
        })
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<Option<User>> {
        let users = self.users.read().expect("RwLock poisoned");
        Ok(users.get(user_id).cloned())
    }

    async fn upsert(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().expect("RwLock poisoned");
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().expect("RwLock poisoned");
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().expect("RwLock poisoned");
        Ok(orders.get(order_id).cloned())
    }

    async fn update(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().expect("RwLock poisoned");
        if !orders.contains_key(&order.id) {
            return Err(CommerceError::OrderNotFound(order.id.clone()));
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let orders = self.orders.read().expect("RwLock poisoned");
        let mut found: Vec<Order> = orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn mark_paid(&self, order_id: &str, card_masked: &str) -> Result<Order> {
        let mut orders = self.orders.write().expect("RwLock poisoned");
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))?;
        if order.paid {
            return Err(CommerceError::AlreadyPaid(order_id.to_string()));
        }
        order.paid = true;
        order.status = OrderStatus::Paid;
        order.card_masked = Some(card_masked.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn record_invoice(
        &self,
        order_id: &str,
        invoice_ref: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut orders = self.orders.write().expect("RwLock poisoned");
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))?;
        order.invoice_ref = Some(invoice_ref.to_string());
        order.invoice_sent_at = Some(sent_at);
        order.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().expect("RwLock poisoned");
        payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Payment>> {
        let payments = self.payments.read().expect("RwLock poisoned");
        Ok(payments.values().find(|p| p.order_id == order_id).cloned())
    }

    async fn find_for_user(&self, user_id: &str) -> Result<Vec<Payment>> {
        let payments = self.payments.read().expect("RwLock poisoned");
        Ok(payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RefundStore for MemoryStore {
    async fn create(&self, request: &RefundRequest) -> Result<()> {
        let mut refunds = self.refunds.write().expect("RwLock poisoned");
        refunds.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn get(&self, request_id: &str) -> Result<Option<RefundRequest>> {
        let refunds = self.refunds.read().expect("RwLock poisoned");
        Ok(refunds.get(request_id).cloned())
    }

    async fn resolve(
        &self,
        request_id: &str,
        resolution: RefundResolution,
    ) -> Result<RefundRequest> {
        let mut refunds = self.refunds.write().expect("RwLock poisoned");
        let request = refunds
            .get_mut(request_id)
            .ok_or_else(|| CommerceError::RefundNotFound(request_id.to_string()))?;
        request.resolve(resolution)?;
        Ok(request.clone())
    }

    async fn find_unprocessed(&self) -> Result<Vec<RefundRequest>> {
        let refunds = self.refunds.read().expect("RwLock poisoned");
        let mut found: Vec<RefundRequest> =
            refunds.values().filter(|r| !r.processed).cloned().collect();
        found.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(found)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn get(&self, user_id: &str) -> Result<Option<OrderHistory>> {
        let history = self.history.read().expect("RwLock poisoned");
        Ok(history.get(user_id).cloned())
    }

    async fn upsert(&self, history: &OrderHistory) -> Result<()> {
        let mut map = self.history.write().expect("RwLock poisoned");
        map.insert(history.user_id.clone(), history.clone());
        Ok(())
    }
}
