//! Refund workflow: request → operator approve/reject. Quantities are
//! validated against each line's refundable remainder before anything is
//! persisted; approval restores stock and may move the order to
//! `Refunded`.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::domain::{RefundItem, RefundRequest, RefundResolution};
use crate::error::{CommerceError, Result};
use crate::service::CommerceService;

#[derive(Clone, Debug, Deserialize)]
pub struct RefundLine {
    pub product_id: String,
    pub quantity: u32,
}

impl CommerceService {
    /// Create a `Requested` refund for one or more lines of an order. Unit
    /// prices are copied from the order snapshot, not the catalog.
    pub async fn request_refund(
        &self,
        order_id: &str,
        user_id: &str,
        lines: &[RefundLine],
    ) -> Result<RefundRequest> {
        if lines.is_empty() {
            return Err(CommerceError::validation(
                "A refund request needs at least one line",
            ));
        }
        let order = self.get_order(order_id).await?;
        if order.user_id != user_id {
            return Err(CommerceError::Ownership {
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        if !order.paid {
            return Err(CommerceError::validation(format!(
                "Order {order_id} has not been paid; nothing to refund"
            )));
        }
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                return Err(CommerceError::validation(
                    "Refund quantity must be at least 1",
                ));
            }
            let ordered = order.line(&line.product_id).ok_or_else(|| {
                CommerceError::validation(format!(
                    "Product {} is not on order {order_id}",
                    line.product_id
                ))
            })?;
            if line.quantity > ordered.refundable() {
                return Err(CommerceError::validation(format!(
                    "Refund of {} exceeds refundable remainder {} for product {}",
                    line.quantity,
                    ordered.refundable(),
                    line.product_id
                )));
            }
            items.push(RefundItem {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_price: ordered.unit_price,
            });
        }
        let request = RefundRequest::new(order_id, user_id, items);
        self.stores.refunds.create(&request).await?;
        info!(request_id = %request.id, %order_id, "refund requested");
        self.events
            .publish(
                "refund.requested",
                json!({ "request_id": request.id, "order_id": order_id }),
            )
            .await;
        Ok(request)
    }

    /// Approve: restore stock per line, bump the order's refunded
    /// counters, and flip the order to `Refunded` when nothing refundable
    /// remains. Re-approving a processed request is a conflict.
    ///
    /// The remainder check runs against the current order before anything
    /// is persisted: two pending requests can each be valid at request
    /// time, and only the first approval may win. A request that no longer
    /// fits stays unprocessed so an operator can reject it.
    pub async fn approve_refund(&self, request_id: &str) -> Result<RefundRequest> {
        let request = self
            .stores
            .refunds
            .get(request_id)
            .await?
            .ok_or_else(|| CommerceError::RefundNotFound(request_id.to_string()))?;
        if request.processed {
            return Err(CommerceError::Conflict(format!(
                "Refund request {request_id} is already processed"
            )));
        }
        let mut order = self.get_order(&request.order_id).await?;
        order.apply_refund(&request.items)?;

        // Validation passed; the atomic resolve below is still the guard
        // against a concurrent approval of the same request.
        let request = self
            .stores
            .refunds
            .resolve(request_id, RefundResolution::Approved)
            .await?;
        self.stores.orders.update(&order).await?;
        for item in &request.items {
            self.stores
                .products
                .adjust_stock(&item.product_id, i64::from(item.quantity))
                .await?;
        }
        info!(
            %request_id,
            order_id = %order.id,
            total = %request.refund_total(),
            fully_refunded = order.fully_refunded(),
            "refund approved"
        );
        self.events
            .publish(
                "refund.approved",
                json!({
                    "request_id": request_id,
                    "order_id": order.id,
                    "total": request.refund_total(),
                }),
            )
            .await;
        Ok(request)
    }

    /// Reject: terminal, no stock movement.
    pub async fn reject_refund(&self, request_id: &str) -> Result<RefundRequest> {
        let request = self
            .stores
            .refunds
            .resolve(request_id, RefundResolution::Rejected)
            .await?;
        info!(%request_id, order_id = %request.order_id, "refund rejected");
        self.events
            .publish(
                "refund.rejected",
                json!({ "request_id": request_id, "order_id": request.order_id }),
            )
            .await;
        Ok(request)
    }

    /// Unprocessed requests, oldest first, for operator review.
    pub async fn active_refund_requests(&self) -> Result<Vec<RefundRequest>> {
        self.stores.refunds.find_unprocessed().await
    }
}
