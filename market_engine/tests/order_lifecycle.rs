//! End-to-end order lifecycle tests against a real SQLite backend.
mod support;

use market_engine::{
    db_types::{OrderState, PaymentStatus},
    traits::{ItemStore, MarketplaceDatabase, OrderFlowError, SettleOutcome},
    OrderQueryApi,
    OrderQueryFilter,
};
use support::{new_api, new_db, payment_event, seed_item, TestGateway};

#[tokio::test]
async fn happy_path_pending_to_completed() {
    let db = new_db("happy_path").await;
    let gateway = TestGateway::new();
    let api = new_api(db.clone(), gateway.clone());
    seed_item(&db, "item-01", "alice", 120).await;

    let (order, checkout_url) = api.create_order("bob", "item-01").await.unwrap();
    assert_eq!(order.state, OrderState::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.seller_id, "alice");
    assert!(checkout_url.starts_with("https://gateway.test/pay/"));
    let session = order.checkout_session_id.clone().unwrap();

    let outcome = api.handle_payment_completed(payment_event("evt-1", &session)).await.unwrap();
    let paid = match outcome {
        SettleOutcome::Paid(o) => o,
        other => panic!("Expected Paid, got {other:?}"),
    };
    assert_eq!(paid.state, OrderState::Paid);
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.payment_reference.as_deref(), Some("pi-evt-1"));
    let item = db.fetch_item("item-01").await.unwrap().unwrap();
    assert!(item.sold);

    let shipping = api.confirm_shipping(&paid.order_id, "alice").await.unwrap();
    assert_eq!(shipping.state, OrderState::Shipping);

    let done = api.confirm_delivery_and_rate(&paid.order_id, "bob", 5, Some("Lovely".into())).await.unwrap();
    assert_eq!(done.state, OrderState::Completed);
    assert!(done.completed_at.is_some());
    assert_eq!(done.rating.unwrap().value(), 5);

    // The happy path never touches the refund side of the gateway.
    assert!(gateway.refunds().is_empty());
    assert_eq!(db.seller_average_rating("alice").await.unwrap(), Some(5.0));
}

#[tokio::test]
async fn buying_your_own_item_is_rejected() {
    let db = new_db("self_purchase").await;
    let api = new_api(db.clone(), TestGateway::new());
    seed_item(&db, "item-02", "alice", 40).await;

    let err = api.create_order("alice", "item-02").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn unknown_and_unavailable_items_are_rejected() {
    let db = new_db("unavailable_items").await;
    let gateway = TestGateway::new();
    let api = new_api(db.clone(), gateway.clone());

    let err = api.create_order("bob", "item-nope").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ItemNotFound(_)), "got {err:?}");

    // A sold item stops being purchasable the moment its settlement commits.
    seed_item(&db, "item-03", "alice", 75).await;
    let (order, _) = api.create_order("bob", "item-03").await.unwrap();
    let session = order.checkout_session_id.unwrap();
    api.handle_payment_completed(payment_event("evt-1", &session)).await.unwrap();
    let err = api.create_order("carol", "item-03").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ItemUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn shipping_requires_paid_state_and_the_right_seller() {
    let db = new_db("shipping_guards").await;
    let api = new_api(db.clone(), TestGateway::new());
    seed_item(&db, "item-04", "alice", 60).await;
    let (order, _) = api.create_order("bob", "item-04").await.unwrap();

    // Not paid yet.
    let err = api.confirm_shipping(&order.order_id, "alice").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::IllegalTransition { from: OrderState::Pending, to: OrderState::Shipping }));

    let session = order.checkout_session_id.clone().unwrap();
    api.handle_payment_completed(payment_event("evt-1", &session)).await.unwrap();

    // Wrong party.
    let err = api.confirm_shipping(&order.order_id, "mallory").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Unauthorized(_)));

    api.confirm_shipping(&order.order_id, "alice").await.unwrap();
    // Shipping twice is an illegal transition, not a silent no-op.
    let err = api.confirm_shipping(&order.order_id, "alice").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::IllegalTransition { from: OrderState::Shipping, to: OrderState::Shipping }));
}

#[tokio::test]
async fn delivery_confirmation_rules() {
    let db = new_db("delivery_rules").await;
    let api = new_api(db.clone(), TestGateway::new());
    seed_item(&db, "item-05", "alice", 90).await;
    let (order, _) = api.create_order("bob", "item-05").await.unwrap();
    let oid = order.order_id.clone();

    // Cannot complete an unpaid order.
    let err = api.confirm_delivery_and_rate(&oid, "bob", 4, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::IllegalTransition { from: OrderState::Pending, .. }));

    let session = order.checkout_session_id.clone().unwrap();
    api.handle_payment_completed(payment_event("evt-1", &session)).await.unwrap();

    // Rating out of range never reaches the database.
    let err = api.confirm_delivery_and_rate(&oid, "bob", 0, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidRating(_)));
    let err = api.confirm_delivery_and_rate(&oid, "bob", 6, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidRating(_)));

    // Only the buyer may confirm delivery.
    let err = api.confirm_delivery_and_rate(&oid, "alice", 4, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Unauthorized(_)));

    // Completing straight from Paid (without a shipping confirmation) is allowed.
    api.confirm_delivery_and_rate(&oid, "bob", 4, None).await.unwrap();

    // The rating is immutable.
    let err = api.confirm_delivery_and_rate(&oid, "bob", 5, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::RatingAlreadySet(_)));
    assert_eq!(db.seller_average_rating("alice").await.unwrap(), Some(4.0));
}

#[tokio::test]
async fn order_search_filters_compose() {
    let db = new_db("order_search").await;
    let gateway = TestGateway::new();
    let api = new_api(db.clone(), gateway.clone());
    let queries = OrderQueryApi::new(db.clone());
    seed_item(&db, "item-01", "alice", 40).await;
    seed_item(&db, "item-02", "alice", 60).await;
    seed_item(&db, "item-03", "diana", 90).await;

    let (o1, _) = api.create_order("bob", "item-01").await.unwrap();
    let (_o2, _) = api.create_order("carol", "item-02").await.unwrap();
    let (o3, _) = api.create_order("bob", "item-03").await.unwrap();
    api.handle_payment_completed(payment_event("evt-1", &o1.checkout_session_id.clone().unwrap())).await.unwrap();

    let paid = queries.search(OrderQueryFilter::default().with_state(OrderState::Paid)).await.unwrap();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].order_id, o1.order_id);

    let alices = queries.search(OrderQueryFilter::default().with_seller_id("alice")).await.unwrap();
    assert_eq!(alices.len(), 2);

    let bobs_pending = queries
        .search(OrderQueryFilter::default().with_buyer_id("bob").with_state(OrderState::Pending))
        .await
        .unwrap();
    assert_eq!(bobs_pending.len(), 1);
    assert_eq!(bobs_pending[0].order_id, o3.order_id);
}

#[tokio::test]
async fn fresh_writes_are_visible_to_subsequent_queries() {
    let db = new_db("write_visibility").await;
    let gateway = TestGateway::new();
    let api = new_api(db.clone(), gateway.clone());

    // Every call acquires its own pool connection, so each write must be durable before the
    // helper returns. A hundred iterations flushes out any write that is only visible to the
    // connection that made it.
    for i in 0..100i64 {
        let item_id = format!("item-{i:03}");
        seed_item(&db, &item_id, "alice", 10 + i).await;
        let item = db.fetch_item(&item_id).await.unwrap();
        assert!(item.is_some(), "item {item_id} vanished between insert and fetch");
    }

    // Same guarantee for the insert-order → attach-session chain inside create_order.
    for i in 0..20i64 {
        let (order, _) = api.create_order("bob", &format!("item-{i:03}")).await.unwrap();
        assert!(order.checkout_session_id.is_some());
        let found = db.fetch_order_by_order_id(&order.order_id).await.unwrap();
        assert!(found.is_some(), "order {} vanished between insert and fetch", order.order_id);
    }
}
