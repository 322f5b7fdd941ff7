//! Shared scaffolding for the engine integration tests: a scriptable in-memory payment gateway
//! and helpers to stand up a fresh SQLite database per test.
use std::sync::{Arc, Mutex};

use market_engine::{
    db_types::{Item, NewItem},
    events::EventProducers,
    test_utils::prepare_env::prepare_test_env,
    traits::{CheckoutSession, GatewayError, ItemStore, PaymentCompleted, PaymentGateway},
    CheckoutUrls,
    OrderFlowApi,
    RetryPolicy,
    SqliteDatabase,
};
use mkt_common::Price;

#[derive(Default)]
struct GatewayState {
    sessions_created: u64,
    refunds: Vec<RefundCall>,
    fail_next_session: Option<GatewayError>,
    refund_failures: Vec<GatewayError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundCall {
    pub payment_reference: String,
    pub idempotency_key: String,
}

/// A recording gateway. Hands out sequential checkout sessions and records every refund call,
/// so tests can assert exactly how many times the provider was hit and with which idempotency
/// keys. Failures can be scripted ahead of time.
#[derive(Default)]
pub struct TestGateway {
    state: Mutex<GatewayState>,
}

impl TestGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_session(&self, err: GatewayError) {
        self.state.lock().unwrap().fail_next_session = Some(err);
    }

    /// Queues gateway errors for upcoming refund calls, consumed one per call, oldest first.
    pub fn script_refund_failures(&self, errors: Vec<GatewayError>) {
        let mut state = self.state.lock().unwrap();
        state.refund_failures = errors;
        state.refund_failures.reverse();
    }

    pub fn sessions_created(&self) -> u64 {
        self.state.lock().unwrap().sessions_created
    }

    pub fn refunds(&self) -> Vec<RefundCall> {
        self.state.lock().unwrap().refunds.clone()
    }
}

impl PaymentGateway for TestGateway {
    async fn create_checkout_session(
        &self,
        _amount: Price,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<CheckoutSession, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next_session.take() {
            return Err(err);
        }
        state.sessions_created += 1;
        let session_id = format!("cs-{:04}", state.sessions_created);
        let url = format!("https://gateway.test/pay/{session_id}");
        Ok(CheckoutSession { session_id, url })
    }

    async fn refund(&self, payment_reference: &str, idempotency_key: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.refund_failures.pop() {
            return Err(err);
        }
        state.refunds.push(RefundCall {
            payment_reference: payment_reference.to_string(),
            idempotency_key: idempotency_key.to_string(),
        });
        Ok(())
    }
}

pub async fn new_db(name: &str) -> SqliteDatabase {
    let url = format!("sqlite://../data/test_{name}.db");
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub fn new_api(db: SqliteDatabase, gateway: Arc<TestGateway>) -> OrderFlowApi<SqliteDatabase, Arc<TestGateway>> {
    let urls = CheckoutUrls::new("https://market.test/checkout/success", "https://market.test/checkout/cancel");
    OrderFlowApi::new(db, gateway, urls, EventProducers::default()).with_retry_policy(RetryPolicy::no_retries())
}

pub async fn seed_item(db: &SqliteDatabase, item_id: &str, seller_id: &str, price_units: i64) -> Item {
    let item = NewItem::with_id(item_id, seller_id, Price::from_units(price_units));
    db.insert_item(item).await.expect("Error inserting item")
}

/// A `payment.completed` event as the webhook layer would hand it to the engine.
pub fn payment_event(event_id: &str, session_id: &str) -> PaymentCompleted {
    PaymentCompleted {
        event_id: event_id.to_string(),
        checkout_session_id: session_id.to_string(),
        payment_reference: format!("pi-{event_id}"),
    }
}
