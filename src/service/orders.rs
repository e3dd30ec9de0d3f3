//! Order state machine operations and the history-derived views.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::domain::{Order, OrderHistory, OrderStatus};
use crate::error::{CommerceError, Result};
use crate::service::CommerceService;

/// Shipped-order view: the order ids plus the product listing derived from
/// them, excluding refunded orders.
#[derive(Debug, Serialize)]
pub struct PreviousOrders {
    pub order_ids: Vec<String>,
    pub products: Vec<PurchasedProduct>,
}

#[derive(Debug, Serialize)]
pub struct PurchasedProduct {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
}

impl CommerceService {
    /// Snapshot the user's active cart into a new `Pending` order. The
    /// order is persisted first and the cart cleared only afterwards, so a
    /// failed persist leaves the cart exactly as it was.
    pub async fn create_order_from_cart(&self, user_id: &str) -> Result<Order> {
        let cart = self
            .stores
            .carts
            .find_active_for_user(user_id)
            .await?
            .ok_or_else(|| CommerceError::CartNotFound(user_id.to_string()))?;
        let order = Order::from_cart(&cart)?;
        self.stores.orders.create(&order).await?;
        self.stores.carts.clear_items(&cart.id).await?;
        info!(order_id = %order.id, %user_id, "order created from cart");
        self.events
            .publish(
                "order.created",
                json!({ "order_id": order.id, "user_id": user_id, "total": order.total() }),
            )
            .await;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.stores
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))
    }

    pub async fn mark_in_transit(&self, order_id: &str) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        order.mark_in_transit()?;
        self.stores.orders.update(&order).await?;
        info!(%order_id, "order in transit");
        Ok(order)
    }

    pub async fn mark_shipped(&self, order_id: &str) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        order.mark_shipped()?;
        self.stores.orders.update(&order).await?;
        info!(%order_id, "order shipped");
        self.events
            .publish("order.shipped", json!({ "order_id": order_id }))
            .await;
        Ok(order)
    }

    /// Idempotent append to the user's completion ledger, plus clearing
    /// whatever is left in their active cart.
    pub async fn record_completion(&self, user_id: &str, order_id: &str) -> Result<()> {
        let mut history = match self.stores.history.get(user_id).await? {
            Some(history) => history,
            None => OrderHistory::for_user(user_id),
        };
        if history.append(order_id) {
            self.stores.history.upsert(&history).await?;
        }
        if let Some(cart) = self.stores.carts.find_active_for_user(user_id).await? {
            if !cart.is_empty() {
                self.stores.carts.clear_items(&cart.id).await?;
            }
        }
        Ok(())
    }

    pub async fn remove_from_history(&self, user_id: &str, order_id: &str) -> Result<()> {
        let mut history = self
            .stores
            .history
            .get(user_id)
            .await?
            .ok_or_else(|| CommerceError::HistoryNotFound(user_id.to_string()))?;
        if history.remove(order_id) {
            self.stores.history.upsert(&history).await?;
        }
        Ok(())
    }

    /// Completed orders that have not yet shipped and are not refunded.
    pub async fn active_orders(&self, user_id: &str) -> Result<Vec<String>> {
        let orders = self.completed_orders(user_id).await?;
        Ok(orders
            .into_iter()
            .filter(Order::is_active)
            .map(|o| o.id)
            .collect())
    }

    /// Shipped orders and their product listing; refunded orders carry no
    /// products into the listing.
    pub async fn previous_orders(&self, user_id: &str) -> Result<PreviousOrders> {
        let orders = self.completed_orders(user_id).await?;
        let shipped: Vec<Order> = orders.into_iter().filter(|o| o.shipped).collect();
        let products = shipped
            .iter()
            .filter(|o| o.status != OrderStatus::Refunded)
            .flat_map(|o| o.items.iter())
            .map(|item| PurchasedProduct {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
            })
            .collect();
        Ok(PreviousOrders {
            order_ids: shipped.into_iter().map(|o| o.id).collect(),
            products,
        })
    }

    async fn completed_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        let Some(history) = self.stores.history.get(user_id).await? else {
            return Ok(vec![]);
        };
        let mut orders = Vec::with_capacity(history.order_ids.len());
        for order_id in &history.order_ids {
            if let Some(order) = self.stores.orders.get(order_id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}
