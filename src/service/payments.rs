//! Payment settlement: the one operation that has to keep several moving
//! parts consistent. Ordering is fixed: every fail-fast check runs before
//! any mutation; the paid flag flips atomically in the store; stock debits
//! and the payment record commit next; invoice dispatch goes last and its
//! failure is reported as a partial outcome instead of unwinding the
//! committed payment.

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::{mask_card, payment, Order, Payment};
use crate::error::{CommerceError, Result};
use crate::service::CommerceService;

#[derive(Debug, Serialize)]
pub struct StockShortfall {
    pub product_id: String,
    pub requested: i64,
    pub debited: i64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InvoiceOutcome {
    Sent {
        artifact: String,
        at: chrono::DateTime<chrono::Utc>,
    },
    /// Payment succeeded but the invoice did not go out; the order keeps
    /// `invoice_sent_at` empty so an operator can re-dispatch.
    Failed { reason: String },
}

#[derive(Debug, Serialize)]
pub struct SettlementOutcome {
    pub order: Order,
    pub payment: Payment,
    pub invoice: InvoiceOutcome,
    pub shortfalls: Vec<StockShortfall>,
}

impl CommerceService {
    /// Pure instrument validation, shared with the settlement path below.
    pub fn validate_instrument(&self, card_number: &str, expiry: &str, cvv: &str) -> Result<()> {
        payment::validate_instrument(card_number, expiry, cvv)
    }

    pub async fn process_payment(
        &self,
        user_id: &str,
        order_id: &str,
        card_number: &str,
        expiry: &str,
        cvv: &str,
    ) -> Result<SettlementOutcome> {
        // Fail-fast phase: nothing below mutates state.
        let order = self.get_order(order_id).await?;
        if order.user_id != user_id {
            return Err(CommerceError::Ownership {
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        if order.paid {
            return Err(CommerceError::AlreadyPaid(order_id.to_string()));
        }
        payment::validate_instrument(card_number, expiry, cvv)?;
        let card_masked = mask_card(card_number)?;
        let user = self
            .stores
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| CommerceError::UserNotFound(user_id.to_string()))?;
        for item in &order.items {
            if self.stores.products.get(&item.product_id).await?.is_none() {
                return Err(CommerceError::ProductNotFound(item.product_id.clone()));
            }
        }

        // Atomic check-and-set; a concurrent settlement loses here with
        // AlreadyPaid and debits nothing.
        let order = self.stores.orders.mark_paid(order_id, &card_masked).await?;

        let mut shortfalls = Vec::new();
        for item in &order.items {
            let debit = self
                .stores
                .products
                .debit_stock_clamped(&item.product_id, i64::from(item.quantity))
                .await?;
            if debit.shortfall > 0 {
                warn!(
                    %order_id,
                    product_id = %item.product_id,
                    requested = item.quantity,
                    debited = debit.debited,
                    "stock debit clamped at zero"
                );
                shortfalls.push(StockShortfall {
                    product_id: item.product_id.clone(),
                    requested: i64::from(item.quantity),
                    debited: debit.debited,
                });
            }
        }

        let payment_record = Payment::new(order_id, user_id, card_masked.clone(), expiry);
        self.stores.payments.create(&payment_record).await?;
        self.record_completion(user_id, order_id).await?;
        info!(%order_id, %user_id, total = %order.total(), "payment settled");
        self.events
            .publish(
                "order.paid",
                json!({ "order_id": order_id, "user_id": user_id, "total": order.total() }),
            )
            .await;

        // Paid and stock state are durable at this point; the dispatch
        // below runs outside any store operation.
        let invoice = self.dispatch_invoice(&order, &user, &card_masked).await;
        let order = self.get_order(order_id).await?;
        Ok(SettlementOutcome {
            order,
            payment: payment_record,
            invoice,
            shortfalls,
        })
    }

    async fn dispatch_invoice(
        &self,
        order: &Order,
        user: &crate::domain::User,
        card_masked: &str,
    ) -> InvoiceOutcome {
        let artifact = self.invoice.render(order, user, card_masked);
        match self.invoice.deliver(user, &artifact).await {
            Ok(sent_at) => {
                let artifact_ref = self.invoice.artifact_ref(order);
                if let Err(err) = self
                    .stores
                    .orders
                    .record_invoice(&order.id, &artifact_ref, sent_at)
                    .await
                {
                    warn!(order_id = %order.id, error = %err, "invoice sent but not recorded");
                    return InvoiceOutcome::Failed {
                        reason: err.to_string(),
                    };
                }
                InvoiceOutcome::Sent {
                    artifact: artifact_ref,
                    at: sent_at,
                }
            }
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "payment settled but invoice delivery failed");
                InvoiceOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}
