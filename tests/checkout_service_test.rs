mod common;

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use assert_matches::assert_matches;
use async_trait::async_trait;
use campus_market_api::{
    entities::order::{OrderStatus, PaymentMethod},
    errors::ServiceError,
    services::{
        commerce::{catalog_service::UpdateProductInput, CheckoutService},
        orders::OrderLedger,
        payments::{PaymentDetails, PaymentGateway, PaymentResult},
    },
};
use chrono::{DateTime, Utc};
use common::{order_input, TestApp};
use mockall::{mock, predicate::*};

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn process(
            &self,
            amount: i64,
            details: &PaymentDetails,
        ) -> Result<PaymentResult, ServiceError>;
    }
}

fn approved() -> Result<PaymentResult, ServiceError> {
    Ok(PaymentResult {
        success: true,
        transaction_id: "TXN-1700000000000-42".to_string(),
        message: "approved".to_string(),
    })
}

#[tokio::test]
async fn gateway_is_charged_the_order_total() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_process()
        .with(eq(27_500), always())
        .times(1)
        .returning(|_, _| approved());

    let app = TestApp::with_gateway(Arc::new(gateway)).await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 5).await;
    let mug = app.seed_product(&app.seller, "Coffee Mug", 2_500, 10).await;
    app.add_to_cart(&app.buyer, lamp.id, 2).await;
    app.add_to_cart(&app.buyer, mug.id, 3).await;
    let order = app.checkout(&app.buyer).await;
    assert_eq!(order.total_amount, 27_500);

    let paid = app
        .state
        .services
        .checkout
        .pay_order(app.buyer.id, order.id, PaymentDetails::Transfer)
        .await
        .expect("paid");

    assert_eq!(paid.transaction_id.as_deref(), Some("TXN-1700000000000-42"));
    assert_eq!(paid.payment_method, PaymentMethod::Transfer);
    assert_eq!(app.product(lamp.id).await.stock, 3);
    assert_eq!(app.product(mug.id).await.stock, 7);
}

#[tokio::test]
async fn gateway_is_not_called_when_revalidation_fails() {
    let mut gateway = MockGateway::new();
    gateway.expect_process().times(0);

    let app = TestApp::with_gateway(Arc::new(gateway)).await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 5).await;
    app.add_to_cart(&app.buyer, lamp.id, 1).await;
    let order = app.checkout(&app.buyer).await;

    app.state
        .services
        .catalog
        .update_product(
            app.seller.id,
            lamp.id,
            UpdateProductInput {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("pause listing");

    let err = app
        .state
        .services
        .checkout
        .pay_order(app.buyer.id, order.id, PaymentDetails::Cash)
        .await
        .expect_err("inactive product");
    assert_matches!(err, ServiceError::ProductInactive(_));
}

#[tokio::test]
async fn gateway_errors_leave_the_order_pending() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_process()
        .times(1)
        .returning(|_, _| Err(ServiceError::InvalidCard("Card number failed validation".into())));

    let app = TestApp::with_gateway(Arc::new(gateway)).await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 5).await;
    app.add_to_cart(&app.buyer, lamp.id, 1).await;
    let order = app.checkout(&app.buyer).await;

    let err = app
        .state
        .services
        .checkout
        .pay_order(
            app.buyer.id,
            order.id,
            PaymentDetails::Card {
                card_number: Some("1234567812345678".into()),
                cvv: None,
                expiry_date: None,
            },
        )
        .await
        .expect_err("gateway rejects card");
    assert_matches!(err, ServiceError::InvalidCard(_));

    let order = app
        .state
        .services
        .checkout
        .get_order(app.buyer.id, false, order.id)
        .await
        .expect("order");
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(app.product(lamp.id).await.stock, 5);
}

#[tokio::test]
async fn decline_from_gateway_maps_to_payment_declined() {
    let mut gateway = MockGateway::new();
    gateway.expect_process().times(1).returning(|_, _| {
        Ok(PaymentResult {
            success: false,
            transaction_id: String::new(),
            message: "Insufficient funds".to_string(),
        })
    });

    let app = TestApp::with_gateway(Arc::new(gateway)).await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 5).await;
    app.add_to_cart(&app.buyer, lamp.id, 1).await;
    let order = app.checkout(&app.buyer).await;

    let err = app
        .state
        .services
        .checkout
        .pay_order(app.buyer.id, order.id, PaymentDetails::Cash)
        .await
        .expect_err("declined");
    match err {
        ServiceError::PaymentDeclined(reason) => assert_eq!(reason, "Insufficient funds"),
        other => panic!("unexpected error: {other:?}"),
    }
}

fn fixed_order_number(_: DateTime<Utc>) -> String {
    "ORD-20250101-00001".to_string()
}

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

fn collides_once_then_fresh(_: DateTime<Utc>) -> String {
    match SEQUENCE.fetch_add(1, Ordering::SeqCst) {
        0 | 1 => "ORD-20250101-00001".to_string(),
        n => format!("ORD-20250101-{:05}", n),
    }
}

fn checkout_with_ledger(app: &TestApp, ledger: OrderLedger) -> CheckoutService {
    let mut gateway = MockGateway::new();
    gateway.expect_process().never();
    CheckoutService::new(
        app.state.db.clone(),
        app.state.event_sender.clone(),
        Arc::new(gateway),
        ledger,
    )
}

#[tokio::test]
async fn order_number_collision_is_retried() {
    let app = TestApp::new().await;
    let checkout = checkout_with_ledger(
        &app,
        OrderLedger::new(3).with_number_generator(collides_once_then_fresh),
    );
    let rival = app.add_user("Rival Buyer", "rival@campus.edu").await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 5).await;

    app.add_to_cart(&app.buyer, lamp.id, 1).await;
    let first = checkout
        .create_order(app.buyer.id, order_input(PaymentMethod::Cash))
        .await
        .expect("first order");
    assert_eq!(first.order_number, "ORD-20250101-00001");

    app.add_to_cart(&rival, lamp.id, 1).await;
    let second = checkout
        .create_order(rival.id, order_input(PaymentMethod::Cash))
        .await
        .expect("second order after retry");
    assert_eq!(second.order_number, "ORD-20250101-00002");
    assert_eq!(second.items.len(), 1);
}

#[tokio::test]
async fn exhausted_order_numbers_roll_back_checkout() {
    let app = TestApp::new().await;
    let checkout = checkout_with_ledger(
        &app,
        OrderLedger::new(2).with_number_generator(fixed_order_number),
    );
    let rival = app.add_user("Rival Buyer", "rival@campus.edu").await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 5).await;

    app.add_to_cart(&app.buyer, lamp.id, 1).await;
    checkout
        .create_order(app.buyer.id, order_input(PaymentMethod::Cash))
        .await
        .expect("first order");

    app.add_to_cart(&rival, lamp.id, 2).await;
    let err = checkout
        .create_order(rival.id, order_input(PaymentMethod::Cash))
        .await
        .expect_err("every number is taken");
    assert_matches!(err, ServiceError::Conflict(_));

    let cart = app
        .state
        .services
        .cart
        .get_or_create_cart(rival.id)
        .await
        .expect("cart");
    assert_eq!(cart.items.len(), 1, "cart survives a failed checkout");
    assert!(checkout
        .list_buyer_orders(rival.id, 10, 0)
        .await
        .expect("orders")
        .is_empty());
}
