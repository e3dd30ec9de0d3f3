//! Postgres backend. Documents with nested lines (cart items, order line
//! items, refund items, history ids) are stored as JSONB columns, keeping
//! the document-store shape of the boundary. The invariant-bearing
//! operations (`mark_paid`, stock adjustments, refund resolution) are
//! single-statement check-and-sets so concurrent callers serialize per
//! document inside the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::domain::order::LineItem;
use crate::domain::refund::RefundItem;
use crate::domain::{
    Cart, CartItem, Order, OrderHistory, Payment, Product, RefundRequest, RefundResolution, User,
};
use crate::error::{CommerceError, Result};
use crate::store::{
    CartStore, HistoryStore, OrderStore, PaymentStore, ProductStore, RefundStore, StockDebit,
    UserStore,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    user_id: String,
    cart_id: String,
    items: Json<Vec<LineItem>>,
    status: String,
    paid: bool,
    shipped: bool,
    card_masked: Option<String>,
    invoice_ref: Option<String>,
    invoice_sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order> {
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            cart_id: self.cart_id,
            items: self.items.0,
            status: self.status.parse()?,
            paid: self.paid,
            shipped: self.shipped,
            card_masked: self.card_masked,
            invoice_ref: self.invoice_ref,
            invoice_sent_at: self.invoice_sent_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: String,
    user_id: String,
    items: Json<Vec<CartItem>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_cart(self) -> Cart {
        Cart {
            id: self.id,
            user_id: self.user_id,
            items: self.items.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefundRow {
    id: String,
    order_id: String,
    user_id: String,
    items: Json<Vec<RefundItem>>,
    requested_at: DateTime<Utc>,
    processed: bool,
    resolution: Option<String>,
}

impl RefundRow {
    fn into_request(self) -> Result<RefundRequest> {
        let resolution = match self.resolution.as_deref() {
            None => None,
            Some("Approved") => Some(RefundResolution::Approved),
            Some("Rejected") => Some(RefundResolution::Rejected),
            Some(other) => {
                return Err(CommerceError::storage(format!(
                    "unknown refund resolution {other}"
                )))
            }
        };
        Ok(RefundRequest {
            id: self.id,
            order_id: self.order_id,
            user_id: self.user_id,
            items: self.items.0,
            requested_at: self.requested_at,
            processed: self.processed,
            resolution,
        })
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn find_active_for_user(&self, user_id: &str) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CommerceError::storage)?;
        Ok(row.map(CartRow::into_cart))
    }

    async fn upsert(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            "INSERT INTO carts (id, user_id, items, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET items = $3, updated_at = $5",
        )
        .bind(&cart.id)
        .bind(&cart.user_id)
        .bind(Json(&cart.items))
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        Ok(())
    }

    async fn clear_items(&self, cart_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE carts SET items = '[]'::jsonb, updated_at = NOW() WHERE id = $1",
        )
        .bind(cart_id)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        if result.rows_affected() == 0 {
            return Err(CommerceError::CartNotFound(cart_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn get(&self, product_id: &str) -> Result<Option<Product>> {
        sqlx::query_as::<_, Product>("SELECT id, name, price, stock FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CommerceError::storage)
    }

    async fn upsert(&self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, name, price, stock) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET name = $2, price = $3, stock = $4",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        Ok(())
    }

    async fn adjust_stock(&self, product_id: &str, delta: i64) -> Result<i64> {
        let row = sqlx::query(
            "UPDATE products SET stock = stock + $2 \
             WHERE id = $1 AND stock + $2 >= 0 RETURNING stock",
        )
        .bind(product_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        match row {
            Some(row) => Ok(row.get::<i64, _>("stock")),
            None => {
                let exists = sqlx::query("SELECT 1 FROM products WHERE id = $1")
                    .bind(product_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(CommerceError::storage)?;
                if exists.is_none() {
                    Err(CommerceError::ProductNotFound(product_id.to_string()))
                } else {
                    Err(CommerceError::validation(format!(
                        "Stock for product {product_id} cannot go below zero"
                    )))
                }
            }
        }
    }

    async fn debit_stock_clamped(&self, product_id: &str, quantity: i64) -> Result<StockDebit> {
        // The locked subselect pins the pre-debit value so the debit and
        // the shortfall calculation see the same stock level.
        let row = sqlx::query(
            "UPDATE products p SET stock = GREATEST(p.stock - $2, 0) \
             FROM (SELECT id, stock AS old_stock FROM products WHERE id = $1 FOR UPDATE) s \
             WHERE p.id = s.id \
             RETURNING p.stock AS remaining, s.old_stock",
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await
        .map_err(CommerceError::storage)?
        .ok_or_else(|| CommerceError::ProductNotFound(product_id.to_string()))?;
        let old_stock: i64 = row.get("old_stock");
        let remaining: i64 = row.get("remaining");
        let debited = quantity.min(old_stock);
        Ok(StockDebit {
            debited,
            shortfall: quantity - debited,
            remaining,
        })
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn get(&self, user_id: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, name, address FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CommerceError::storage)
    }

    async fn upsert(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, name, address) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET email = $2, name = $3, address = $4",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.address)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, cart_id, items, status, paid, \
             shipped, card_masked, invoice_ref, invoice_sent_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.user_id)
        .bind(&order.cart_id)
        .bind(Json(&order.items))
        .bind(order.status.as_str())
        .bind(order.paid)
        .bind(order.shipped)
        .bind(&order.card_masked)
        .bind(&order.invoice_ref)
        .bind(order.invoice_sent_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CommerceError::storage)?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn update(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET items = $2, status = $3, paid = $4, shipped = $5, \
             card_masked = $6, invoice_ref = $7, invoice_sent_at = $8, updated_at = $9 \
             WHERE id = $1",
        )
        .bind(&order.id)
        .bind(Json(&order.items))
        .bind(order.status.as_str())
        .bind(order.paid)
        .bind(order.shipped)
        .bind(&order.card_masked)
        .bind(&order.invoice_ref)
        .bind(order.invoice_sent_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        if result.rows_affected() == 0 {
            return Err(CommerceError::OrderNotFound(order.id.clone()));
        }
        Ok(())
    }

    async fn find_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn mark_paid(&self, order_id: &str, card_masked: &str) -> Result<Order> {
        let row = sqlx::query_as::<_, OrderRow>(
            "UPDATE orders SET paid = TRUE, status = 'Paid', card_masked = $2, \
             updated_at = NOW() WHERE id = $1 AND paid = FALSE RETURNING *",
        )
        .bind(order_id)
        .bind(card_masked)
        .fetch_optional(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        match row {
            Some(row) => row.into_order(),
            None => {
                let exists = sqlx::query("SELECT 1 FROM orders WHERE id = $1")
                    .bind(order_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(CommerceError::storage)?;
                if exists.is_none() {
                    Err(CommerceError::OrderNotFound(order_id.to_string()))
                } else {
                    Err(CommerceError::AlreadyPaid(order_id.to_string()))
                }
            }
        }
    }

    async fn record_invoice(
        &self,
        order_id: &str,
        invoice_ref: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET invoice_ref = $2, invoice_sent_at = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(invoice_ref)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        if result.rows_affected() == 0 {
            return Err(CommerceError::OrderNotFound(order_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn create(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            "INSERT INTO payments (id, order_id, user_id, card_masked, expiry, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(&payment.user_id)
        .bind(&payment.card_masked)
        .bind(&payment.expiry)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        Ok(())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CommerceError::storage)
    }

    async fn find_for_user(&self, user_id: &str) -> Result<Vec<Payment>> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(CommerceError::storage)
    }
}

#[async_trait]
impl RefundStore for PgStore {
    async fn create(&self, request: &RefundRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO refund_requests (id, order_id, user_id, items, requested_at, \
             processed, resolution) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&request.id)
        .bind(&request.order_id)
        .bind(&request.user_id)
        .bind(Json(&request.items))
        .bind(request.requested_at)
        .bind(request.processed)
        .bind(request.resolution.map(|r| r.as_str()))
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        Ok(())
    }

    async fn get(&self, request_id: &str) -> Result<Option<RefundRequest>> {
        let row = sqlx::query_as::<_, RefundRow>("SELECT * FROM refund_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CommerceError::storage)?;
        row.map(RefundRow::into_request).transpose()
    }

    async fn resolve(
        &self,
        request_id: &str,
        resolution: RefundResolution,
    ) -> Result<RefundRequest> {
        let row = sqlx::query_as::<_, RefundRow>(
            "UPDATE refund_requests SET processed = TRUE, resolution = $2 \
             WHERE id = $1 AND processed = FALSE RETURNING *",
        )
        .bind(request_id)
        .bind(resolution.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        match row {
            Some(row) => row.into_request(),
            None => {
                let exists = sqlx::query("SELECT 1 FROM refund_requests WHERE id = $1")
                    .bind(request_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(CommerceError::storage)?;
                if exists.is_none() {
                    Err(CommerceError::RefundNotFound(request_id.to_string()))
                } else {
                    Err(CommerceError::Conflict(format!(
                        "Refund request {request_id} is already processed"
                    )))
                }
            }
        }
    }

    async fn find_unprocessed(&self) -> Result<Vec<RefundRequest>> {
        let rows = sqlx::query_as::<_, RefundRow>(
            "SELECT * FROM refund_requests WHERE processed = FALSE ORDER BY requested_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        rows.into_iter().map(RefundRow::into_request).collect()
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn get(&self, user_id: &str) -> Result<Option<OrderHistory>> {
        let row = sqlx::query("SELECT * FROM order_history WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CommerceError::storage)?;
        Ok(row.map(|row| OrderHistory {
            user_id: row.get("user_id"),
            order_ids: row.get::<Json<Vec<String>>, _>("order_ids").0,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn upsert(&self, history: &OrderHistory) -> Result<()> {
        sqlx::query(
            "INSERT INTO order_history (user_id, order_ids, created_at, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET order_ids = $2, updated_at = $4",
        )
        .bind(&history.user_id)
        .bind(Json(&history.order_ids))
        .bind(history.created_at)
        .bind(history.updated_at)
        .execute(&self.pool)
        .await
        .map_err(CommerceError::storage)?;
        Ok(())
    }
}
