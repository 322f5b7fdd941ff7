use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use mkt_common::Secret;
use serde_json::json;

use super::helpers::{happy_gateway, new_api, new_test_db, seed_item, TestGateway, TestOrderFlowApi};
use crate::{
    helpers::calculate_hmac,
    middleware::SignatureMiddlewareFactory,
    webhook_routes::PaymentWebhookRoute,
};
use market_engine::{traits::MarketplaceDatabase, SqliteDatabase};

const WEBHOOK_SECRET: &str = "whsec_endpoint_tests";

async fn webhook_request(api: TestOrderFlowApi, body: String, signature: Option<String>) -> (StatusCode, String) {
    webhook_request_with_checks(api, body, signature, true).await
}

async fn webhook_request_with_checks(
    api: TestOrderFlowApi,
    body: String,
    signature: Option<String>,
    checks_enabled: bool,
) -> (StatusCode, String) {
    let app = App::new().app_data(web::Data::new(api)).service(
        web::scope("/webhooks")
            .wrap(SignatureMiddlewareFactory::new(
                "x-payment-signature",
                Secret::new(WEBHOOK_SECRET.to_string()),
                checks_enabled,
            ))
            .service(PaymentWebhookRoute::<SqliteDatabase, TestGateway>::new()),
    );
    let service = test::init_service(app).await;
    let mut req = TestRequest::post()
        .uri("/webhooks/payment")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body);
    if let Some(sig) = signature {
        req = req.insert_header(("x-payment-signature", sig));
    }
    // Middleware rejections surface as a service-level `Err`; render them to the HTTP
    // response the client would see, as `call_service` would panic on them.
    let res = match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => res.into_parts().1,
        Err(e) => e.error_response(),
    };
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}

fn sign(body: &str) -> String {
    calculate_hmac(WEBHOOK_SECRET, body.as_bytes())
}

#[actix_web::test]
async fn unsigned_deliveries_are_rejected() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let body = json!({"id": "evt-1", "type": "payment.completed"}).to_string();
    let (status, _) = webhook_request(api, body, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn badly_signed_deliveries_are_rejected() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let body = json!({"id": "evt-1", "type": "payment.completed"}).to_string();
    let (status, _) = webhook_request(api, body, Some("bm90IGEgcmVhbCBzaWduYXR1cmU=".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unrecognised_event_kinds_are_acknowledged() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let body = json!({"id": "evt-2", "type": "payout.created"}).to_string();
    let sig = sign(&body);
    let (status, response) = webhook_request(api, body, Some(sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, r#"{"received":true}"#);
}

#[actix_web::test]
async fn payment_completed_without_payload_fields_is_a_400() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let body = json!({"id": "evt-3", "type": "payment.completed", "data": {}}).to_string();
    let sig = sign(&body);
    let (status, _) = webhook_request(api, body, Some(sig)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn a_signed_payment_settles_the_order() {
    let db = new_test_db().await;
    seed_item(&db, "itm-hook", "seller-1", 40).await;
    let api = new_api(db.clone(), happy_gateway());
    let (order, _) = api.create_order("buyer-1", "itm-hook").await.unwrap();

    let body = json!({
        "id": "evt-4",
        "type": "payment.completed",
        "data": {"checkoutSessionId": "cs-0001", "paymentReference": "pi-4"}
    })
    .to_string();
    let sig = sign(&body);
    let (status, response) = webhook_request(api, body, Some(sig)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    assert_eq!(response, r#"{"received":true}"#);

    let settled = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert!(settled.is_paid());
}

#[actix_web::test]
async fn replayed_deliveries_are_still_acknowledged() {
    let db = new_test_db().await;
    seed_item(&db, "itm-replay", "seller-1", 25).await;
    let api = new_api(db.clone(), happy_gateway());
    let (order, _) = api.create_order("buyer-1", "itm-replay").await.unwrap();

    let body = json!({
        "id": "evt-7",
        "type": "payment.completed",
        "data": {"checkoutSessionId": "cs-0001", "paymentReference": "pi-7"}
    })
    .to_string();
    let sig = sign(&body);
    let (status, response) = webhook_request(api.clone(), body.clone(), Some(sig.clone())).await;
    assert_eq!(status, StatusCode::OK, "{response}");

    // The gateway redelivers the identical event; it must get the same 200 ack, not an error
    // that would keep the redelivery loop alive.
    let (status, response) = webhook_request(api, body, Some(sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, r#"{"received":true}"#);

    let settled = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
    assert!(settled.is_paid());
}

#[actix_web::test]
async fn events_for_unknown_sessions_are_acknowledged() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let body = json!({
        "id": "evt-5",
        "type": "payment.completed",
        "data": {"checkoutSessionId": "cs-nope", "paymentReference": "pi-5"}
    })
    .to_string();
    let sig = sign(&body);
    let (status, response) = webhook_request(api, body, Some(sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, r#"{"received":true}"#);
}

#[actix_web::test]
async fn signature_checks_can_be_disabled_for_development() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let body = json!({"id": "evt-6", "type": "payout.created"}).to_string();
    let (status, _) = webhook_request_with_checks(api, body, None, false).await;
    assert_eq!(status, StatusCode::OK);
}
