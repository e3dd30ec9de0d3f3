//! Order aggregate and its status state machine.
//!
//! Line items are snapshotted from the cart at creation time and never
//! re-read from the live catalog; the only field that moves afterwards is
//! the per-line `refunded` counter, which grows monotonically and never
//! past the ordered quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::cart::Cart;
use crate::domain::refund::RefundItem;
use crate::error::{CommerceError, Result};

/// Canonical lifecycle states. Serialized spellings are the contract:
/// `Pending`, `Processing`, `Paid`, `InTransit`, `Delivered`, `Refunded`.
/// Inbound strings parse case-insensitively (see [`OrderStatus::from_str`]);
/// everything internal compares enum values, never strings.
///
/// `Processing` is accepted from stored or inbound data but is never set
/// by the settlement path itself, which moves `Pending` directly to
/// `Paid`; it slots between the two for upstream systems that stage
/// orders there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Paid,
    InTransit,
    Delivered,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Paid => "Paid",
            Self::InTransit => "InTransit",
            Self::Delivered => "Delivered",
            Self::Refunded => "Refunded",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Paid => 2,
            Self::InTransit => 3,
            Self::Delivered => 4,
            Self::Refunded => 5,
        }
    }

    /// Transitions are one-directional; `Refunded` is only reachable once
    /// payment has settled.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        match next {
            OrderStatus::Refunded => matches!(
                self,
                OrderStatus::Paid | OrderStatus::InTransit | OrderStatus::Delivered
            ),
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CommerceError;

    fn from_str(s: &str) -> Result<Self> {
        // "shipped" survives as an inbound alias for the delivered stage.
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "paid" => Ok(Self::Paid),
            "intransit" | "in-transit" => Ok(Self::InTransit),
            "delivered" | "shipped" => Ok(Self::Delivered),
            "refunded" => Ok(Self::Refunded),
            other => Err(CommerceError::validation(format!(
                "Unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price at the time the order was created.
    pub unit_price: Decimal,
    /// Quantity already refunded against this line.
    #[serde(default)]
    pub refunded: u32,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Originally ordered quantity minus quantity already refunded.
    pub fn refundable(&self) -> u32 {
        self.quantity - self.refunded
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub cart_id: String,
    pub items: Vec<LineItem>,
    pub status: OrderStatus,
    pub paid: bool,
    pub shipped: bool,
    pub card_masked: Option<String>,
    pub invoice_ref: Option<String>,
    pub invoice_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Snapshot a cart into a new `Pending` order. The cart itself is left
    /// untouched; the caller clears it only after the order is persisted.
    pub fn from_cart(cart: &Cart) -> Result<Self> {
        if cart.is_empty() {
            return Err(CommerceError::EmptyCart(cart.id.clone()));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            order_number: format!("ORD-{:08}", rand::random::<u32>()),
            user_id: cart.user_id.clone(),
            cart_id: cart.id.clone(),
            items: cart
                .items
                .iter()
                .map(|i| LineItem {
                    product_id: i.product_id.clone(),
                    name: i.name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    refunded: 0,
                })
                .collect(),
            status: OrderStatus::Pending,
            paid: false,
            shipped: false,
            card_masked: None,
            invoice_ref: None,
            invoice_sent_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }

    pub fn line(&self, product_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn transition(&mut self, next: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CommerceError::Conflict(format!(
                "Order {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn mark_in_transit(&mut self) -> Result<()> {
        self.transition(OrderStatus::InTransit)
    }

    pub fn mark_shipped(&mut self) -> Result<()> {
        self.transition(OrderStatus::Delivered)?;
        self.shipped = true;
        Ok(())
    }

    /// Not yet shipped and not refunded.
    pub fn is_active(&self) -> bool {
        !self.shipped && self.status != OrderStatus::Refunded
    }

    pub fn fully_refunded(&self) -> bool {
        self.items.iter().all(|i| i.refunded == i.quantity)
    }

    /// Bump the per-line refunded counters for an approved refund. Fails
    /// before mutating anything if any line would be over-refunded. Flips
    /// the order to `Refunded` once every line is exhausted; the shipped
    /// flag is deliberately left alone.
    pub fn apply_refund(&mut self, refund_items: &[RefundItem]) -> Result<()> {
        for item in refund_items {
            let line = self.line(&item.product_id).ok_or_else(|| {
                CommerceError::validation(format!(
                    "Product {} is not on order {}",
                    item.product_id, self.id
                ))
            })?;
            if item.quantity > line.refundable() {
                return Err(CommerceError::validation(format!(
                    "Refund of {} exceeds refundable remainder {} for product {}",
                    item.quantity,
                    line.refundable(),
                    item.product_id
                )));
            }
        }
        for item in refund_items {
            if let Some(line) = self.items.iter_mut().find(|l| l.product_id == item.product_id) {
                line.refunded += item.quantity;
            }
        }
        if self.fully_refunded() {
            self.status = OrderStatus::Refunded;
        }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
