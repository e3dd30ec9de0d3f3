//! Invoice boundary. The core only needs `render` to be deterministic and
//! `deliver` to be safely retryable; rendering internals (PDF, templates)
//! and the mail transport live outside this service. Settlement calls this
//! after payment and stock state have committed, and treats a delivery
//! failure as a reportable partial outcome, never a rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Order, User};
use crate::error::Result;

#[async_trait]
pub trait InvoiceService: Send + Sync {
    /// Pure render of the invoice artifact for an order.
    fn render(&self, order: &Order, user: &User, card_masked: &str) -> Vec<u8>;

    /// Deliver the artifact to the user. May fail transiently; the caller
    /// records the returned timestamp on success and surfaces failure as a
    /// retryable outcome.
    async fn deliver(&self, user: &User, artifact: &[u8]) -> Result<DateTime<Utc>>;

    /// Stable reference under which the artifact is recorded on the order.
    fn artifact_ref(&self, order: &Order) -> String {
        format!("invoices/{}.txt", order.id)
    }
}

/// Default dispatcher: renders a plain-text invoice and "delivers" it by
/// logging the send. Stands in for the real mail-out in development and in
/// the test suite.
pub struct LoggingInvoiceService;

#[async_trait]
impl InvoiceService for LoggingInvoiceService {
    fn render(&self, order: &Order, user: &User, card_masked: &str) -> Vec<u8> {
        let mut body = String::new();
        body.push_str(&format!("INVOICE {}\n", order.order_number));
        body.push_str(&format!("Billed to: {} <{}>\n", user.name, user.email));
        if let Some(address) = &user.address {
            body.push_str(&format!("Address: {address}\n"));
        }
        body.push('\n');
        for item in &order.items {
            body.push_str(&format!(
                "{:<40} {:>4} x {:>10} = {:>10}\n",
                item.name,
                item.quantity,
                item.unit_price,
                item.line_total()
            ));
        }
        body.push_str(&format!("\nTotal: {}\n", order.total()));
        body.push_str(&format!("Paid with card {card_masked}\n"));
        body.into_bytes()
    }

    async fn deliver(&self, user: &User, artifact: &[u8]) -> Result<DateTime<Utc>> {
        tracing::info!(email = %user.email, bytes = artifact.len(), "invoice dispatched");
        Ok(Utc::now())
    }
}
