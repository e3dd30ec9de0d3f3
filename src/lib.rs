//! Storefront — order lifecycle and payment settlement service.
//!
//! The workflow an order moves through: cart snapshot → `Pending` order →
//! payment settlement (instrument validation, atomic paid flag, clamped
//! stock debit, invoice dispatch) → operator transitions (`InTransit`,
//! `Delivered`) → per-user order history → refund workflow (request,
//! approve with stock restore, reject).
//!
//! ## Layers
//! - `domain`: aggregates and pure rules (state machine, card validation,
//!   refundable remainders)
//! - `store`: document-store boundary with Postgres and in-memory backends
//! - `service`: the workflow core
//! - `api`: thin axum handlers
//! - `invoice` / `events`: external collaborator boundaries

pub mod api;
pub mod domain;
pub mod error;
pub mod events;
pub mod invoice;
pub mod service;
pub mod store;

pub use error::{CommerceError, Result};
