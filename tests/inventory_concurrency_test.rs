mod common;

use std::sync::Arc;

use campus_market_api::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::{
        inventory::{InventoryError, InventoryGuard, StockDemand},
        orders::OrderLedger,
        payments::PaymentDetails,
    },
};
use common::TestApp;
use sea_orm::TransactionTrait;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_payments_never_oversell() {
    let app = Arc::new(TestApp::new().await);
    let rival = app.add_user("Rival Buyer", "rival@campus.edu").await;
    let bike = app.seed_product(&app.seller, "Campus Bike", 45_000, 2).await;

    // Both orders are created while stock still covers each of them.
    app.add_to_cart(&app.buyer, bike.id, 2).await;
    let first = app.checkout(&app.buyer).await;
    app.add_to_cart(&rival, bike.id, 2).await;
    let second = app.checkout(&rival).await;

    let pay = |buyer_id: Uuid, order_id: Uuid| {
        let app = app.clone();
        tokio::spawn(async move {
            app.state
                .services
                .checkout
                .pay_order(buyer_id, order_id, PaymentDetails::Cash)
                .await
        })
    };

    let (a, b) = futures::future::join(pay(app.buyer.id, first.id), pay(rival.id, second.id)).await;
    let results = vec![a.expect("join"), b.expect("join")];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one payment may capture the stock");

    for result in &results {
        if let Err(err) = result {
            assert_eq!(err.status_code().as_u16(), 422, "loser failed with {err:?}");
        }
    }

    let bike = app.product(bike.id).await;
    assert_eq!(bike.stock, 0);
    assert!(bike.is_sold);

    // The losing order stays pending.
    let statuses = [
        app.state
            .services
            .checkout
            .get_order(app.buyer.id, false, first.id)
            .await
            .expect("first order")
            .status,
        app.state
            .services
            .checkout
            .get_order(rival.id, false, second.id)
            .await
            .expect("second order")
            .status,
    ];
    assert!(statuses.contains(&OrderStatus::Paid));
    assert!(statuses.contains(&OrderStatus::Pending));
}

#[tokio::test]
async fn stock_commit_is_conditional_on_remaining_quantity() {
    let app = TestApp::new().await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 3).await;
    app.add_to_cart(&app.buyer, lamp.id, 2).await;
    let order = app.checkout(&app.buyer).await;

    let ledger = OrderLedger::default();
    let view = ledger
        .find_one(&*app.state.db, order.id)
        .await
        .expect("order with items");

    let txn = app.state.db.begin().await.expect("begin");
    ledger.commit_stock(&txn, &view.items).await.expect("first commit");
    txn.commit().await.expect("commit");
    assert_eq!(app.product(lamp.id).await.stock, 1);

    let txn = app.state.db.begin().await.expect("begin");
    let err = ledger
        .commit_stock(&txn, &view.items)
        .await
        .expect_err("only one unit left");
    txn.rollback().await.expect("rollback");

    assert!(matches!(err, ServiceError::InsufficientStock(_)));
    let lamp = app.product(lamp.id).await;
    assert_eq!(lamp.stock, 1);
    assert!(!lamp.is_sold);
}

#[tokio::test]
async fn guard_reports_every_failing_line() {
    let app = TestApp::new().await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 1).await;
    let chair = app.seed_product(&app.seller, "Office Chair", 8_000, 5).await;
    let missing = Uuid::new_v4();

    let guard = InventoryGuard::new();
    let err = guard
        .validate(
            &*app.state.db,
            &[
                StockDemand::new(lamp.id, 3),
                StockDemand::new(chair.id, 2),
                StockDemand::new(missing, 1),
            ],
        )
        .await
        .expect_err("two lines cannot be covered");

    let failures = match err {
        InventoryError::Rejected(failures) => failures,
        other => panic!("expected a rejection, got {other:?}"),
    };
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().any(|f| f.product_id() == lamp.id));
    assert!(failures.iter().any(|f| f.product_id() == missing));

    guard
        .validate(&*app.state.db, &[StockDemand::new(chair.id, 5)])
        .await
        .expect("exact stock is enough");
}

#[tokio::test]
async fn stale_status_write_is_a_concurrent_modification() {
    let app = TestApp::new().await;
    let lamp = app.seed_product(&app.seller, "Desk Lamp", 10_000, 5).await;
    app.add_to_cart(&app.buyer, lamp.id, 1).await;
    let order = app.checkout(&app.buyer).await;

    app.state
        .services
        .checkout
        .pay_order(app.buyer.id, order.id, PaymentDetails::Cash)
        .await
        .expect("paid");

    // A cancel that read the order while it was still pending.
    let err = OrderLedger::default()
        .set_status(
            &*app.state.db,
            order.id,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
        )
        .await
        .expect_err("status moved underneath");
    assert!(matches!(err, ServiceError::ConcurrentModification(id) if id == order.id));
    assert_eq!(err.status_code().as_u16(), 409);

    let current = app
        .state
        .services
        .checkout
        .get_order(app.buyer.id, false, order.id)
        .await
        .expect("order");
    assert_eq!(current.status, OrderStatus::Paid);
    assert_eq!(app.product(lamp.id).await.stock, 4);
}

#[tokio::test]
async fn racing_cancels_restore_stock_once() {
    let app = Arc::new(TestApp::new().await);
    let chair = app.seed_product(&app.seller, "Office Chair", 8_000, 4).await;
    app.add_to_cart(&app.buyer, chair.id, 3).await;
    let order = app.checkout(&app.buyer).await;
    app.state
        .services
        .checkout
        .pay_order(app.buyer.id, order.id, PaymentDetails::Cash)
        .await
        .expect("paid");
    assert_eq!(app.product(chair.id).await.stock, 1);

    let cancel = |order_id: Uuid| {
        let app = app.clone();
        tokio::spawn(async move {
            app.state
                .services
                .checkout
                .cancel_order(app.buyer.id, order_id)
                .await
        })
    };

    let (a, b) = futures::future::join(cancel(order.id), cancel(order.id)).await;
    let results = vec![a.expect("join"), b.expect("join")];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(
                    err,
                    ServiceError::ConcurrentModification(_) | ServiceError::AlreadyCancelled
                ),
                "loser failed with {err:?}"
            );
        }
    }

    let chair = app.product(chair.id).await;
    assert_eq!(chair.stock, 4);
    assert!(!chair.is_sold);
}
