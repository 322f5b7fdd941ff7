use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::{json, Value};

use super::helpers::{api_request, authed, happy_gateway, issue_token, new_api, new_test_db, seed_item};

#[actix_web::test]
async fn requests_without_a_token_are_rejected() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let req = TestRequest::post().uri("/order/create").set_json(json!({"itemId": "itm-1"}));
    let (status, body) = api_request(req, api).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No Authorization header provided"), "{body}");
}

#[actix_web::test]
async fn tampered_tokens_are_rejected() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let mut token = issue_token("alice");
    token.replace_range(token.len() - 10..token.len() - 5, "00000");
    let req = TestRequest::post()
        .uri("/order/create")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(json!({"itemId": "itm-1"}));
    let (status, _) = api_request(req, api).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn create_order_returns_the_checkout_url() {
    let db = new_test_db().await;
    seed_item(&db, "itm-paint-1", "seller-1", 120).await;
    let api = new_api(db, happy_gateway());
    let req = authed(TestRequest::post().uri("/order/create"), "buyer-1").set_json(json!({"itemId": "itm-paint-1"}));
    let (status, body) = api_request(req, api).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["checkoutUrl"], "https://gateway.test/pay/cs-0001");
    assert!(response["orderId"].as_str().unwrap().starts_with("ord-"));
}

#[actix_web::test]
async fn ordering_an_unknown_item_is_a_404() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let req = authed(TestRequest::post().uri("/order/create"), "buyer-1").set_json(json!({"itemId": "itm-nope"}));
    let (status, _) = api_request(req, api).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn buying_your_own_item_is_a_422() {
    let db = new_test_db().await;
    seed_item(&db, "itm-own", "seller-1", 50).await;
    let api = new_api(db, happy_gateway());
    let req = authed(TestRequest::post().uri("/order/create"), "seller-1").set_json(json!({"itemId": "itm-own"}));
    let (status, _) = api_request(req, api).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn items_can_be_listed_and_non_positive_prices_cannot() {
    let db = new_test_db().await;
    let api = new_api(db, happy_gateway());
    let req = authed(TestRequest::post().uri("/item/create"), "seller-1")
        .set_json(json!({"itemId": "itm-new", "price": 75}));
    let (status, body) = api_request(req, api.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let item: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(item["item_id"], "itm-new");

    let req = authed(TestRequest::post().uri("/item/create"), "seller-1").set_json(json!({"price": 0}));
    let (status, _) = api_request(req, api).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn shipping_an_unpaid_order_is_a_409() {
    let db = new_test_db().await;
    seed_item(&db, "itm-slow", "seller-1", 10).await;
    let api = new_api(db, happy_gateway());
    let req = authed(TestRequest::post().uri("/order/create"), "buyer-1").set_json(json!({"itemId": "itm-slow"}));
    let (status, body) = api_request(req, api.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let response: Value = serde_json::from_str(&body).unwrap();
    let order_id = response["orderId"].as_str().unwrap().to_string();

    let req = authed(TestRequest::post().uri("/order/confirm-shipping"), "seller-1")
        .set_json(json!({"orderId": order_id}));
    let (status, _) = api_request(req, api).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn buyers_only_see_their_own_orders() {
    let db = new_test_db().await;
    seed_item(&db, "itm-priv", "seller-1", 10).await;
    let api = new_api(db, happy_gateway());
    let req = authed(TestRequest::post().uri("/order/create"), "buyer-1").set_json(json!({"itemId": "itm-priv"}));
    let (status, body) = api_request(req, api.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let response: Value = serde_json::from_str(&body).unwrap();
    let order_id = response["orderId"].as_str().unwrap().to_string();

    let req = authed(TestRequest::get().uri(&format!("/order/buy/{order_id}")), "buyer-1");
    let (status, body) = api_request(req, api.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let req = authed(TestRequest::get().uri(&format!("/order/buy/{order_id}")), "buyer-2");
    let (status, _) = api_request(req, api).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
