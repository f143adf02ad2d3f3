mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::{json, Value};

async fn publish(app: &TestApp, title: &str, price: i64, stock: i32) -> String {
    let response = app
        .request_as(
            &app.seller,
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "title": title,
                "description": "Barely used, picked up on campus",
                "price": price,
                "condition": "used",
                "stock": stock
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    body["data"]["id"].as_str().expect("product id").to_string()
}

async fn place_order(app: &TestApp, product_id: &str, quantity: i32) -> Value {
    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            "/api/v1/cart/add",
            Some(json!({ "product_id": product_id, "quantity": quantity })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "payment_method": "card",
                "shipping_address": "Dormitory C, room 214, North Campus",
                "notes": "Leave at the front desk"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["data"].clone()
}

#[tokio::test]
async fn full_checkout_over_http() {
    let app = TestApp::new().await;
    let product_id = publish(&app, "Desk Lamp", 10_000, 5).await;

    let order = place_order(&app, &product_id, 2).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total_amount"], 20_000);
    assert_eq!(order["items"][0]["product_title"], "Desk Lamp");
    let order_id = order["id"].as_str().expect("order id").to_string();

    let cart = response_json(
        app.request_as(&app.buyer, Method::GET, "/api/v1/cart", None)
            .await,
    )
    .await;
    assert_eq!(cart["data"]["items"].as_array().map(Vec::len), Some(0));

    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            &format!("/api/v1/orders/{}/pay", order_id),
            Some(json!({
                "payment_method": "card",
                "card_number": "4242 4242 4242 4242",
                "cvv": "123",
                "expiry_date": "12/30"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let paid = response_json(response).await;
    assert_eq!(paid["data"]["status"], "paid");
    assert!(paid["data"]["transaction_id"]
        .as_str()
        .is_some_and(|t| t.starts_with("TXN-")));

    let product = response_json(
        app.request(Method::GET, &format!("/api/v1/products/{}", product_id), None, None)
            .await,
    )
    .await;
    assert_eq!(product["data"]["stock"], 3);

    let response = app
        .request_as(
            &app.seller,
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_as(
            &app.seller,
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "delivered" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "delivered");

    let response = app
        .request_as(
            &app.buyer,
            Method::PATCH,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn declined_card_returns_payment_required() {
    let app = TestApp::new().await;
    let product_id = publish(&app, "Desk Lamp", 10_000, 5).await;
    let order = place_order(&app, &product_id, 1).await;
    let order_id = order["id"].as_str().expect("order id");

    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            &format!("/api/v1/orders/{}/pay", order_id),
            Some(json!({ "payment_method": "card", "card_number": "4000000000000002" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.contains("declined")));

    let order = response_json(
        app.request_as(
            &app.buyer,
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(order["data"]["status"], "pending");
}

#[tokio::test]
async fn second_payment_conflicts() {
    let app = TestApp::new().await;
    let product_id = publish(&app, "Desk Lamp", 10_000, 5).await;
    let order = place_order(&app, &product_id, 1).await;
    let uri = format!("/api/v1/orders/{}/pay", order["id"].as_str().expect("order id"));

    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            &uri,
            Some(json!({ "payment_method": "cash" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            &uri,
            Some(json!({ "payment_method": "cash" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn empty_cart_checkout_is_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "payment_method": "cash",
                "shipping_address": "Dormitory C, room 214, North Campus"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn short_shipping_address_is_rejected() {
    let app = TestApp::new().await;
    let product_id = publish(&app, "Desk Lamp", 10_000, 5).await;
    app.request_as(
        &app.buyer,
        Method::POST,
        "/api/v1/cart/add",
        Some(json!({ "product_id": product_id, "quantity": 1 })),
    )
    .await;

    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "payment_method": "cash", "shipping_address": "Dorm" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_require_authentication() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/orders", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some("not-a-token"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn strangers_cannot_read_or_move_orders() {
    let app = TestApp::new().await;
    let stranger = app.add_user("Stranger", "stranger@campus.edu").await;
    let product_id = publish(&app, "Desk Lamp", 10_000, 5).await;
    let order = place_order(&app, &product_id, 1).await;
    let order_id = order["id"].as_str().expect("order id");

    let response = app
        .request_as(
            &stranger,
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_as(
            &app.admin,
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_as(
            &stranger,
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_as(
            &app.seller,
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "delivered" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request_as(
            &app.seller,
            Method::GET,
            "/api/v1/orders/sales",
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let sales = response_json(response).await;
    assert_eq!(sales["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn buyer_cancel_returns_stock() {
    let app = TestApp::new().await;
    let product_id = publish(&app, "Office Chair", 8_000, 4).await;
    let order = place_order(&app, &product_id, 3).await;
    let order_id = order["id"].as_str().expect("order id");

    let response = app
        .request_as(
            &app.buyer,
            Method::POST,
            &format!("/api/v1/orders/{}/pay", order_id),
            Some(json!({ "payment_method": "transfer" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_as(
            &app.buyer,
            Method::PATCH,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "cancelled");

    let product = response_json(
        app.request(Method::GET, &format!("/api/v1/products/{}", product_id), None, None)
            .await,
    )
    .await;
    assert_eq!(product["data"]["stock"], 4);
    assert_eq!(product["data"]["is_sold"], false);
}
