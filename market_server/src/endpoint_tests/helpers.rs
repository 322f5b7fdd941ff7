use std::sync::Arc;

use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use market_engine::{
    db_types::NewItem,
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{CheckoutSession, ItemStore},
    CheckoutUrls,
    OrderFlowApi,
    OrderQueryApi,
    RetryPolicy,
    SqliteDatabase,
};
use mkt_common::{Price, Secret};

use super::mocks::MockPaymentProcessor;
use crate::{
    auth::TokenIssuer,
    config::AuthConfig,
    routes::{
        BuyOrderRoute,
        CancelOrderRoute,
        ConfirmDeliveryRateRoute,
        ConfirmShippingRoute,
        ItemCreateRoute,
        LatestBuyOrdersRoute,
        OrderCreateRoute,
        SellOrderRoute,
    },
};

pub type TestGateway = Arc<MockPaymentProcessor>;
pub type TestOrderFlowApi = OrderFlowApi<SqliteDatabase, TestGateway>;

// Test-only signing secret. DO NOT re-use this key anywhere.
pub fn auth_config() -> AuthConfig {
    AuthConfig { jwt_secret: Secret::new("endpoint-test-jwt-secret-endpoint-test-jwt-secret".to_string()) }
}

pub fn issue_token(user_id: &str) -> String {
    TokenIssuer::new(&auth_config()).issue_token(user_id, None).expect("Failed to sign token")
}

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to test database")
}

/// A gateway mock that hands out checkout sessions and accepts refunds without complaint.
pub fn happy_gateway() -> TestGateway {
    let mut gateway = MockPaymentProcessor::new();
    gateway.expect_create_checkout_session().returning(|_, _, _| {
        Ok(CheckoutSession { session_id: "cs-0001".to_string(), url: "https://gateway.test/pay/cs-0001".to_string() })
    });
    gateway.expect_refund().returning(|_, _| Ok(()));
    Arc::new(gateway)
}

pub fn new_api(db: SqliteDatabase, gateway: TestGateway) -> TestOrderFlowApi {
    OrderFlowApi::new(db, gateway, CheckoutUrls::new("https://shop.test/done", "https://shop.test/cancelled"), EventProducers::default())
        .with_retry_policy(RetryPolicy::no_retries())
}

pub async fn seed_item(db: &SqliteDatabase, item_id: &str, seller_id: &str, price_units: i64) {
    db.insert_item(NewItem::with_id(item_id, seller_id, Price::from_units(price_units)))
        .await
        .expect("Error seeding item");
}

/// Sends a request against an app wired like the authenticated `/api` scope and returns the
/// status and body.
pub async fn api_request(req: TestRequest, api: TestOrderFlowApi) -> (StatusCode, String) {
    let db = api.db().clone();
    let app = App::new()
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(OrderQueryApi::new(db)))
        .app_data(web::Data::new(TokenIssuer::new(&auth_config())))
        .service(OrderCreateRoute::<SqliteDatabase, TestGateway>::new())
        .service(ConfirmShippingRoute::<SqliteDatabase, TestGateway>::new())
        .service(CancelOrderRoute::<SqliteDatabase, TestGateway>::new())
        .service(ConfirmDeliveryRateRoute::<SqliteDatabase, TestGateway>::new())
        .service(ItemCreateRoute::<SqliteDatabase, TestGateway>::new())
        .service(BuyOrderRoute::<SqliteDatabase>::new())
        .service(SellOrderRoute::<SqliteDatabase>::new())
        .service(LatestBuyOrdersRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}

pub fn authed(req: TestRequest, user_id: &str) -> TestRequest {
    req.insert_header(("Authorization", format!("Bearer {}", issue_token(user_id))))
}
