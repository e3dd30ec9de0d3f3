//! End-to-end workflow tests over the in-memory store: checkout, payment
//! settlement, history views, and the refund workflow.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use storefront::domain::{Order, OrderStatus, Product, User};
use storefront::error::Result;
use storefront::events::EventPublisher;
use storefront::invoice::{InvoiceService, LoggingInvoiceService};
use storefront::service::{CommerceService, InvoiceOutcome, RefundLine};
use storefront::store::Stores;
use storefront::CommerceError;

const CARD: &str = "1234567890123456";
const EXPIRY: &str = "12/30";
const CVV: &str = "123";

struct FailingInvoiceService;

#[async_trait]
impl InvoiceService for FailingInvoiceService {
    fn render(&self, _order: &Order, _user: &User, _card_masked: &str) -> Vec<u8> {
        b"invoice".to_vec()
    }

    async fn deliver(&self, _user: &User, _artifact: &[u8]) -> Result<DateTime<Utc>> {
        Err(CommerceError::InvoiceDelivery("smtp unreachable".into()))
    }
}

fn service_with_invoice(invoice: Arc<dyn InvoiceService>) -> CommerceService {
    CommerceService::new(Stores::in_memory(), invoice, EventPublisher::disabled())
}

fn service() -> CommerceService {
    service_with_invoice(Arc::new(LoggingInvoiceService))
}

async fn seed(s: &CommerceService) {
    for (id, name, price, stock) in [
        ("P1", "Widget", Decimal::new(10, 0), 100),
        ("P2", "Gadget", Decimal::new(5, 0), 50),
    ] {
        s.stores
            .products
            .upsert(&Product {
                id: id.into(),
                name: name.into(),
                price,
                stock,
            })
            .await
            .unwrap();
    }
    for id in ["u1", "u2"] {
        s.stores
            .users
            .upsert(&User {
                id: id.into(),
                email: format!("{id}@example.com"),
                name: format!("User {id}"),
                address: Some("1 Main St".into()),
            })
            .await
            .unwrap();
    }
}

async fn checkout(s: &CommerceService, user_id: &str, lines: &[(&str, u32)]) -> Order {
    for (product_id, quantity) in lines {
        s.add_to_cart(user_id, product_id, *quantity).await.unwrap();
    }
    s.create_order_from_cart(user_id).await.unwrap()
}

async fn stock_of(s: &CommerceService, product_id: &str) -> i64 {
    s.stores
        .products
        .get(product_id)
        .await
        .unwrap()
        .unwrap()
        .stock
}

#[tokio::test]
async fn order_snapshot_survives_catalog_price_changes() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2), ("P2", 1)]).await;

    // Reprice the catalog after the order exists.
    s.stores
        .products
        .upsert(&Product {
            id: "P1".into(),
            name: "Widget".into(),
            price: Decimal::new(99, 0),
            stock: 100,
        })
        .await
        .unwrap();

    let order = s.get_order(&order.id).await.unwrap();
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].unit_price, Decimal::new(10, 0));
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.items[1].unit_price, Decimal::new(5, 0));
    assert_eq!(order.total(), Decimal::new(25, 0));
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn checkout_clears_the_cart_but_keeps_it() {
    let s = service();
    seed(&s).await;
    checkout(&s, "u1", &[("P1", 1)]).await;
    let cart = s.get_cart("u1").await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn empty_cart_cannot_become_an_order() {
    let s = service();
    seed(&s).await;
    let cart = s.get_cart("u1").await.unwrap();
    let err = s.create_order_from_cart("u1").await.unwrap_err();
    assert!(matches!(err, CommerceError::EmptyCart(_)));
    // Cart untouched by the failed attempt.
    let after = s.get_cart("u1").await.unwrap();
    assert_eq!(after.id, cart.id);
    assert!(after.is_empty());
}

#[tokio::test]
async fn expired_card_is_rejected() {
    let s = service();
    let err = s
        .validate_instrument(CARD, "01/20", CVV)
        .unwrap_err();
    assert!(err.to_string().contains("expired"));
}

#[tokio::test]
async fn payment_requires_order_ownership() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2)]).await;

    let err = s
        .process_payment("u2", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::Ownership { .. }));
    // No stock moved on the failed attempt.
    assert_eq!(stock_of(&s, "P1").await, 100);
    assert!(!s.get_order(&order.id).await.unwrap().paid);
}

#[tokio::test]
async fn settlement_debits_stock_and_records_everything() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2), ("P2", 1)]).await;

    let outcome = s
        .process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();

    assert!(outcome.order.paid);
    assert_eq!(outcome.order.status, OrderStatus::Paid);
    assert_eq!(outcome.order.card_masked.as_deref(), Some("************3456"));
    assert_eq!(outcome.payment.card_masked, "************3456");
    assert!(outcome.shortfalls.is_empty());
    assert!(matches!(outcome.invoice, InvoiceOutcome::Sent { .. }));
    assert_eq!(stock_of(&s, "P1").await, 98);
    assert_eq!(stock_of(&s, "P2").await, 49);

    let stored = s.get_order(&order.id).await.unwrap();
    assert!(stored.invoice_sent_at.is_some());
    assert_eq!(
        stored.invoice_ref.as_deref(),
        Some(format!("invoices/{}.txt", order.id).as_str())
    );

    // Settlement lands the order in the completion ledger.
    assert_eq!(s.active_orders("u1").await.unwrap(), vec![order.id.clone()]);

    let payment = s
        .stores
        .payments
        .find_by_order(&order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.user_id, "u1");
}

#[tokio::test]
async fn an_order_settles_at_most_once() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2)]).await;

    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();
    let err = s
        .process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::AlreadyPaid(_)));
    // Debited exactly once.
    assert_eq!(stock_of(&s, "P1").await, 98);
}

#[tokio::test]
async fn concurrent_settlements_cannot_both_win() {
    let s = Arc::new(service());
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2)]).await;

    let a = {
        let s = s.clone();
        let id = order.id.clone();
        tokio::spawn(async move { s.process_payment("u1", &id, CARD, EXPIRY, CVV).await })
    };
    let b = {
        let s = s.clone();
        let id = order.id.clone();
        tokio::spawn(async move { s.process_payment("u1", &id, CARD, EXPIRY, CVV).await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert_eq!(
        a.is_ok() as u8 + b.is_ok() as u8,
        1,
        "exactly one settlement must win"
    );
    assert_eq!(stock_of(&s, "P1").await, 98);
}

#[tokio::test]
async fn stock_never_goes_negative_and_shortfalls_are_reported() {
    let s = service();
    seed(&s).await;
    s.stores
        .products
        .upsert(&Product {
            id: "P3".into(),
            name: "Rare".into(),
            price: Decimal::new(20, 0),
            stock: 1,
        })
        .await
        .unwrap();
    let order = checkout(&s, "u1", &[("P3", 3)]).await;

    let outcome = s
        .process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();
    assert_eq!(outcome.shortfalls.len(), 1);
    assert_eq!(outcome.shortfalls[0].product_id, "P3");
    assert_eq!(outcome.shortfalls[0].requested, 3);
    assert_eq!(outcome.shortfalls[0].debited, 1);
    assert_eq!(stock_of(&s, "P3").await, 0);
}

#[tokio::test]
async fn invoice_failure_is_a_partial_success() {
    let s = service_with_invoice(Arc::new(FailingInvoiceService));
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 1)]).await;

    let outcome = s
        .process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();
    // Payment is committed, stock moved, but no invoice on record.
    assert!(matches!(outcome.invoice, InvoiceOutcome::Failed { .. }));
    assert!(outcome.order.paid);
    assert_eq!(stock_of(&s, "P1").await, 99);
    let stored = s.get_order(&order.id).await.unwrap();
    assert!(stored.invoice_sent_at.is_none());
    assert!(stored.invoice_ref.is_none());
}

#[tokio::test]
async fn history_views_follow_shipping_and_refunds() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2)]).await;
    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();

    assert_eq!(s.active_orders("u1").await.unwrap(), vec![order.id.clone()]);
    let previous = s.previous_orders("u1").await.unwrap();
    assert!(previous.order_ids.is_empty());

    s.mark_in_transit(&order.id).await.unwrap();
    assert_eq!(s.active_orders("u1").await.unwrap(), vec![order.id.clone()]);

    s.mark_shipped(&order.id).await.unwrap();
    assert!(s.active_orders("u1").await.unwrap().is_empty());
    let previous = s.previous_orders("u1").await.unwrap();
    assert_eq!(previous.order_ids, vec![order.id.clone()]);
    assert_eq!(previous.products.len(), 1);
    assert_eq!(previous.products[0].product_id, "P1");

    // A fully refunded order stays listed but contributes no products.
    let request = s
        .request_refund(
            &order.id,
            "u1",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 2,
            }],
        )
        .await
        .unwrap();
    s.approve_refund(&request.id).await.unwrap();
    let previous = s.previous_orders("u1").await.unwrap();
    assert_eq!(previous.order_ids, vec![order.id.clone()]);
    assert!(previous.products.is_empty());
}

#[tokio::test]
async fn completion_ledger_is_idempotent_and_removable() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 1)]).await;
    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();

    // A replayed completion does not duplicate the entry.
    s.record_completion("u1", &order.id).await.unwrap();
    let history = s.stores.history.get("u1").await.unwrap().unwrap();
    assert_eq!(history.order_ids, vec![order.id.clone()]);

    s.remove_from_history("u1", &order.id).await.unwrap();
    // Removing an absent id is a no-op.
    s.remove_from_history("u1", &order.id).await.unwrap();
    assert!(s.active_orders("u1").await.unwrap().is_empty());

    let err = s.remove_from_history("nobody", "x").await.unwrap_err();
    assert!(matches!(err, CommerceError::HistoryNotFound(_)));
}

#[tokio::test]
async fn over_refund_is_rejected_without_persisting() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2)]).await;
    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();

    let err = s
        .request_refund(
            &order.id,
            "u1",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 3,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));
    assert!(s.active_refund_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn refund_requires_a_paid_order() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 1)]).await;
    let err = s
        .request_refund(
            &order.id,
            "u1",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 1,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));
}

#[tokio::test]
async fn refund_requires_order_ownership() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 1)]).await;
    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();
    let err = s
        .request_refund(
            &order.id,
            "u2",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 1,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::Ownership { .. }));
}

#[tokio::test]
async fn full_refund_restores_stock_and_flips_status() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2)]).await;
    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();
    assert_eq!(stock_of(&s, "P1").await, 98);

    let request = s
        .request_refund(
            &order.id,
            "u1",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 2,
            }],
        )
        .await
        .unwrap();
    assert_eq!(s.active_refund_requests().await.unwrap().len(), 1);

    let resolved = s.approve_refund(&request.id).await.unwrap();
    assert!(resolved.processed);
    assert_eq!(stock_of(&s, "P1").await, 100);

    let order = s.get_order(&order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert!(order.fully_refunded());
    assert!(s.active_refund_requests().await.unwrap().is_empty());

    // Terminal: neither resolution can run again.
    assert!(matches!(
        s.approve_refund(&request.id).await.unwrap_err(),
        CommerceError::Conflict(_)
    ));
    assert!(matches!(
        s.reject_refund(&request.id).await.unwrap_err(),
        CommerceError::Conflict(_)
    ));
}

#[tokio::test]
async fn partial_refunds_track_the_refundable_remainder() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2), ("P2", 1)]).await;
    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();

    let first = s
        .request_refund(
            &order.id,
            "u1",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 1,
            }],
        )
        .await
        .unwrap();
    s.approve_refund(&first.id).await.unwrap();

    let order_after = s.get_order(&order.id).await.unwrap();
    assert_eq!(order_after.status, OrderStatus::Paid);
    assert_eq!(order_after.line("P1").unwrap().refunded, 1);
    assert_eq!(stock_of(&s, "P1").await, 99);

    // Remainder is now 1; asking for 2 fails, 1 succeeds.
    assert!(s
        .request_refund(
            &order.id,
            "u1",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 2,
            }],
        )
        .await
        .is_err());
    let second = s
        .request_refund(
            &order.id,
            "u1",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 1,
            }],
        )
        .await
        .unwrap();
    s.approve_refund(&second.id).await.unwrap();
    // P2 still unrefunded, so the order is not terminal yet.
    let order_after = s.get_order(&order.id).await.unwrap();
    assert_eq!(order_after.status, OrderStatus::Paid);
    assert_eq!(stock_of(&s, "P1").await, 100);
}

#[tokio::test]
async fn overlapping_refund_requests_only_settle_once() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2)]).await;
    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();

    // Both requests are valid against the remainder at request time.
    let line = || {
        vec![RefundLine {
            product_id: "P1".into(),
            quantity: 2,
        }]
    };
    let first = s.request_refund(&order.id, "u1", &line()).await.unwrap();
    let second = s.request_refund(&order.id, "u1", &line()).await.unwrap();

    s.approve_refund(&first.id).await.unwrap();
    assert_eq!(stock_of(&s, "P1").await, 100);

    // The second approval fails validation and must leave no trace:
    // the request stays unprocessed and stock is not credited twice.
    let err = s.approve_refund(&second.id).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));
    let stored = s.stores.refunds.get(&second.id).await.unwrap().unwrap();
    assert!(!stored.processed);
    assert!(stored.resolution.is_none());
    let pending = s.active_refund_requests().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);
    assert_eq!(stock_of(&s, "P1").await, 100);
    let order = s.get_order(&order.id).await.unwrap();
    assert_eq!(order.line("P1").unwrap().refunded, 2);

    // An operator can still clear it with a reject.
    s.reject_refund(&second.id).await.unwrap();
    assert!(s.active_refund_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_refund_moves_no_stock() {
    let s = service();
    seed(&s).await;
    let order = checkout(&s, "u1", &[("P1", 2)]).await;
    s.process_payment("u1", &order.id, CARD, EXPIRY, CVV)
        .await
        .unwrap();

    let request = s
        .request_refund(
            &order.id,
            "u1",
            &[RefundLine {
                product_id: "P1".into(),
                quantity: 2,
            }],
        )
        .await
        .unwrap();
    let resolved = s.reject_refund(&request.id).await.unwrap();
    assert!(resolved.processed);
    assert_eq!(stock_of(&s, "P1").await, 98);
    let order = s.get_order(&order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.line("P1").unwrap().refunded, 0);
}
