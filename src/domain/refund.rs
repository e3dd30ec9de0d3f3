//! Refund request lifecycle: `Requested (processed = false)` until an
//! operator resolves it, then terminally `processed = true` with an
//! approved or rejected resolution.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CommerceError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundResolution {
    Approved,
    Rejected,
}

impl RefundResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefundItem {
    pub product_id: String,
    pub quantity: u32,
    /// Unit price at original purchase time, copied from the order
    /// snapshot, never the current catalog price.
    pub unit_price: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: String,
    pub order_id: String,
    pub user_id: String,
    pub items: Vec<RefundItem>,
    pub requested_at: DateTime<Utc>,
    pub processed: bool,
    pub resolution: Option<RefundResolution>,
}

impl RefundRequest {
    pub fn new(
        order_id: impl Into<String>,
        user_id: impl Into<String>,
        items: Vec<RefundItem>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.into(),
            user_id: user_id.into(),
            items,
            requested_at: Utc::now(),
            processed: false,
            resolution: None,
        }
    }

    pub fn refund_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum()
    }

    pub fn resolve(&mut self, resolution: RefundResolution) -> Result<()> {
        if self.processed {
            return Err(CommerceError::Conflict(format!(
                "Refund request {} is already processed",
                self.id
            )));
        }
        self.processed = true;
        self.resolution = Some(resolution);
        Ok(())
    }
}
