//! Checkout-session failure compensation.
mod support;

use market_engine::traits::{GatewayError, MarketplaceDatabase, OrderFlowError, SettleOutcome};
use support::{new_api, new_db, payment_event, seed_item, TestGateway};

#[tokio::test]
async fn failed_session_creation_removes_the_orphaned_order() {
    let db = new_db("checkout_compensation").await;
    let gateway = TestGateway::new();
    let api = new_api(db.clone(), gateway.clone());
    seed_item(&db, "item-01", "alice", 130).await;

    gateway.fail_next_session(GatewayError::Transient("gateway down".into()));
    let err = api.create_order("bob", "item-01").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Gateway(_)), "got {err:?}");

    // No pending row left behind, and the item is still purchasable.
    let orphans = db.fetch_orders_for_buyer("bob", &Default::default()).await.unwrap();
    assert!(orphans.is_empty());
    let (order, _) = api.create_order("bob", "item-01").await.unwrap();
    let session = order.checkout_session_id.unwrap();
    let outcome = api.handle_payment_completed(payment_event("evt-1", &session)).await.unwrap();
    assert!(matches!(outcome, SettleOutcome::Paid(_)));
}

#[tokio::test]
async fn checkout_session_is_attached_exactly_once() {
    let db = new_db("session_immutable").await;
    let gateway = TestGateway::new();
    let api = new_api(db.clone(), gateway.clone());
    seed_item(&db, "item-02", "alice", 130).await;
    let (order, _) = api.create_order("bob", "item-02").await.unwrap();

    let err = db.attach_checkout_session(&order.order_id, "cs-other").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::CheckoutSessionImmutable(_)), "got {err:?}");
    let unchanged = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert_eq!(unchanged.checkout_session_id, order.checkout_session_id);
}
