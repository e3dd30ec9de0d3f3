//! HTTP surface: thin forwarding from handlers to the service core.
//! Request DTOs get shape checks via `validator`; everything with a real
//! invariant is enforced in the service and domain layers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use validator::Validate;

use crate::domain::{Cart, Order, RefundRequest};
use crate::error::{CommerceError, Result};
use crate::service::{CommerceService, PreviousOrders, RefundLine, SettlementOutcome};

pub type AppState = Arc<CommerceService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/carts/:user_id", get(get_cart))
        .route("/api/v1/carts/:user_id/items", post(add_cart_item))
        .route("/api/v1/orders", post(create_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/transit", post(mark_in_transit))
        .route("/api/v1/orders/:id/shipped", post(mark_shipped))
        .route("/api/v1/orders/:id/pay", post(pay_order))
        .route("/api/v1/payments/validate", post(validate_card))
        .route("/api/v1/users/:user_id/orders/active", get(active_orders))
        .route("/api/v1/users/:user_id/orders/previous", get(previous_orders))
        .route(
            "/api/v1/users/:user_id/history/:order_id",
            delete(remove_from_history),
        )
        .route("/api/v1/refunds", post(request_refund))
        .route("/api/v1/refunds/active", get(active_refunds))
        .route("/api/v1/refunds/:id/approve", post(approve_refund))
        .route("/api/v1/refunds/:id/reject", post(reject_refund))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

fn validated<T: Validate>(req: &T) -> Result<()> {
    req.validate()
        .map_err(|e| CommerceError::Validation(e.to_string()))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "storefront" }))
}

async fn get_cart(State(s): State<AppState>, Path(user_id): Path<String>) -> Result<Json<Cart>> {
    Ok(Json(s.get_cart(&user_id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddCartItemRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

async fn add_cart_item(
    State(s): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<Cart>)> {
    validated(&req)?;
    let cart = s.add_to_cart(&user_id, &req.product_id, req.quantity).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
}

async fn create_order(
    State(s): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    validated(&req)?;
    let order = s.create_order_from_cart(&req.user_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>> {
    Ok(Json(s.get_order(&id).await?))
}

async fn mark_in_transit(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    Ok(Json(s.mark_in_transit(&id).await?))
}

async fn mark_shipped(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>> {
    Ok(Json(s.mark_shipped(&id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub card_number: String,
    #[validate(length(min = 1))]
    pub expiry: String,
    #[validate(length(min = 1))]
    pub cvv: String,
}

async fn pay_order(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PayRequest>,
) -> Result<Json<SettlementOutcome>> {
    validated(&req)?;
    let outcome = s
        .process_payment(&req.user_id, &id, &req.card_number, &req.expiry, &req.cvv)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCardRequest {
    #[validate(length(min = 1))]
    pub card_number: String,
    #[validate(length(min = 1))]
    pub expiry: String,
    #[validate(length(min = 1))]
    pub cvv: String,
}

async fn validate_card(
    State(s): State<AppState>,
    Json(req): Json<ValidateCardRequest>,
) -> Result<Json<serde_json::Value>> {
    validated(&req)?;
    s.validate_instrument(&req.card_number, &req.expiry, &req.cvv)?;
    Ok(Json(serde_json::json!({ "valid": true })))
}

async fn active_orders(
    State(s): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(s.active_orders(&user_id).await?))
}

async fn previous_orders(
    State(s): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PreviousOrders>> {
    Ok(Json(s.previous_orders(&user_id).await?))
}

async fn remove_from_history(
    State(s): State<AppState>,
    Path((user_id, order_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    s.remove_from_history(&user_id, &order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RefundRequestBody {
    pub order_id: String,
    pub user_id: String,
    pub items: Vec<RefundLine>,
}

async fn request_refund(
    State(s): State<AppState>,
    Json(req): Json<RefundRequestBody>,
) -> Result<(StatusCode, Json<RefundRequest>)> {
    let request = s
        .request_refund(&req.order_id, &req.user_id, &req.items)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn active_refunds(State(s): State<AppState>) -> Result<Json<Vec<RefundRequest>>> {
    Ok(Json(s.active_refund_requests().await?))
}

async fn approve_refund(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RefundRequest>> {
    Ok(Json(s.approve_refund(&id).await?))
}

async fn reject_refund(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RefundRequest>> {
    Ok(Json(s.reject_refund(&id).await?))
}
