//! Document-store boundary. One trait per collaborator store; the service
//! core only ever talks to these seams, so the same workflow runs against
//! Postgres in production and the in-memory backend in tests.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Cart, Order, OrderHistory, Payment, Product, RefundRequest, RefundResolution, User};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of a clamped stock debit: the quantity actually taken, the
/// unmet remainder, and the stock level afterwards.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct StockDebit {
    pub debited: i64,
    pub shortfall: i64,
    pub remaining: i64,
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_active_for_user(&self, user_id: &str) -> Result<Option<Cart>>;
    async fn upsert(&self, cart: &Cart) -> Result<()>;
    /// Empties the cart's items; the document itself survives.
    async fn clear_items(&self, cart_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, product_id: &str) -> Result<Option<Product>>;
    async fn upsert(&self, product: &Product) -> Result<()>;
    /// Atomic read-modify-write. Rejects any delta that would take stock
    /// below zero and returns the new count otherwise.
    async fn adjust_stock(&self, product_id: &str, delta: i64) -> Result<i64>;
    /// Atomic debit clamped at zero; demand beyond availability is
    /// reported as a shortfall instead of driving the count negative.
    async fn debit_stock_clamped(&self, product_id: &str, quantity: i64) -> Result<StockDebit>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<User>>;
    async fn upsert(&self, user: &User) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &Order) -> Result<()>;
    async fn get(&self, order_id: &str) -> Result<Option<Order>>;
    async fn update(&self, order: &Order) -> Result<()>;
    async fn find_for_user(&self, user_id: &str) -> Result<Vec<Order>>;
    /// Atomic check-and-set of the paid flag: flips `paid`, moves the
    /// status to `Paid`, and records the masked card in one step. Errors
    /// with `AlreadyPaid` when the flag was already set, so two concurrent
    /// settlements cannot both succeed.
    async fn mark_paid(&self, order_id: &str, card_masked: &str) -> Result<Order>;
    async fn record_invoice(
        &self,
        order_id: &str,
        invoice_ref: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: &Payment) -> Result<()>;
    async fn find_by_order(&self, order_id: &str) -> Result<Option<Payment>>;
    async fn find_for_user(&self, user_id: &str) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    async fn create(&self, request: &RefundRequest) -> Result<()>;
    async fn get(&self, request_id: &str) -> Result<Option<RefundRequest>>;
    /// Atomic check-and-set on the processed flag; errors with `Conflict`
    /// when the request was already resolved.
    async fn resolve(&self, request_id: &str, resolution: RefundResolution)
        -> Result<RefundRequest>;
    async fn find_unprocessed(&self) -> Result<Vec<RefundRequest>>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<OrderHistory>>;
    async fn upsert(&self, history: &OrderHistory) -> Result<()>;
}

/// Bundle handed to the service core.
#[derive(Clone)]
pub struct Stores {
    pub carts: Arc<dyn CartStore>,
    pub products: Arc<dyn ProductStore>,
    pub users: Arc<dyn UserStore>,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub refunds: Arc<dyn RefundStore>,
    pub history: Arc<dyn HistoryStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            carts: store.clone(),
            products: store.clone(),
            users: store.clone(),
            orders: store.clone(),
            payments: store.clone(),
            refunds: store.clone(),
            history: store,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            carts: store.clone(),
            products: store.clone(),
            users: store.clone(),
            orders: store.clone(),
            payments: store.clone(),
            refunds: store.clone(),
            history: store,
        }
    }
}
