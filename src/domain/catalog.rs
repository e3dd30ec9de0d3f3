//! Catalog boundary types. The catalog itself is managed elsewhere; this
//! service only reads product prices and moves stock through the ledger
//! operations on [`crate::store::ProductStore`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    /// Available quantity; never negative.
    pub stock: i64,
}

/// User fields needed for invoice rendering and delivery.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub address: Option<String>,
}
