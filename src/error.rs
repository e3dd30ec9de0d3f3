//! Error taxonomy for the order workflow.
//!
//! Not-found, ownership, and validation failures are raised before any
//! mutation is persisted. Conflicts guard against duplicate side effects
//! (double payment, re-resolving a refund). Invoice delivery failures are
//! surfaced as part of a settlement outcome, not through this type, so a
//! committed payment is never reported as a total failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No active cart for user {0}")]
    CartNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Refund request not found: {0}")]
    RefundNotFound(String),

    #[error("No order history for user {0}")]
    HistoryNotFound(String),

    #[error("Cart {0} has no items")]
    EmptyCart(String),

    #[error("Order {order_id} does not belong to user {user_id}")]
    Ownership { order_id: String, user_id: String },

    #[error("{0}")]
    Validation(String),

    #[error("Order {0} is already paid")]
    AlreadyPaid(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invoice delivery failed: {0}")]
    InvoiceDelivery(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CommerceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::OrderNotFound(_)
            | Self::CartNotFound(_)
            | Self::ProductNotFound(_)
            | Self::UserNotFound(_)
            | Self::RefundNotFound(_)
            | Self::HistoryNotFound(_) => StatusCode::NOT_FOUND,
            Self::Ownership { .. } => StatusCode::FORBIDDEN,
            Self::EmptyCart(_) | Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyPaid(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvoiceDelivery(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CommerceError>;
