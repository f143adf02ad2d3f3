#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use campus_market_api::{
    auth::hash_password,
    config::AppConfig,
    db,
    entities::{
        product,
        user::{self, UserRole},
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        commerce::{
            cart_service::AddToCartInput,
            catalog_service::CreateProductInput,
            checkout_service::CreateOrderInput,
        },
        orders::OrderResponse,
        payments::{PaymentGateway, SimulatedPaymentGateway},
    },
    AppState,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use campus_market_api::entities::order::PaymentMethod;
use campus_market_api::entities::product::ProductCondition;

/// A seeded account plus a bearer token for it.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

/// Helper harness backed by a throwaway SQLite file with a single pooled connection.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub buyer: TestUser,
    pub seller: TestUser,
    pub admin: TestUser,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Fresh schema, instant payment gateway.
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(SimulatedPaymentGateway::instant())).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir");
        let db_path = db_dir.path().join("campus_market_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_min_latency_ms = 0;
        cfg.payment_max_latency_ms = 0;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg, gateway);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let buyer = seed_user(&state, "Buyer Student", "buyer@campus.edu", UserRole::User).await;
        let seller =
            seed_user(&state, "Seller Student", "seller@campus.edu", UserRole::User).await;
        let admin = seed_user(&state, "Campus Admin", "admin@campus.edu", UserRole::Admin).await;

        let router = campus_market_api::app_router(state.clone());

        Self {
            router,
            state,
            buyer,
            seller,
            admin,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub async fn add_user(&self, name: &str, email: &str) -> TestUser {
        seed_user(&self.state, name, email, UserRole::User).await
    }

    /// Publishes a product owned by `seller`.
    pub async fn seed_product(
        &self,
        seller: &TestUser,
        title: &str,
        price: i64,
        stock: i32,
    ) -> product::Model {
        let created = self
            .state
            .services
            .catalog
            .create_product(
                seller.id,
                CreateProductInput {
                    title: title.to_string(),
                    description: Some(format!("{} in good shape", title)),
                    price,
                    condition: ProductCondition::Used,
                    stock: Some(stock),
                    category_id: None,
                },
            )
            .await
            .expect("seed product");
        self.product(created.id).await
    }

    /// Current catalog row for a product.
    pub async fn product(&self, id: Uuid) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
    }

    /// Writes a price straight to the row, skipping catalog validation.
    pub async fn force_price(&self, id: Uuid, price: i64) -> product::Model {
        let mut active: product::ActiveModel = self.product(id).await.into();
        active.price = Set(price);
        active
            .update(&*self.state.db)
            .await
            .expect("force product price")
    }

    pub async fn add_to_cart(&self, user: &TestUser, product_id: Uuid, quantity: i32) {
        self.state
            .services
            .cart
            .add_to_cart(user.id, AddToCartInput { product_id, quantity })
            .await
            .expect("add to cart");
    }

    /// Cart -> pending order through the service layer.
    pub async fn checkout(&self, user: &TestUser) -> OrderResponse {
        self.state
            .services
            .checkout
            .create_order(user.id, order_input(PaymentMethod::Card))
            .await
            .expect("create order")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for authenticated JSON requests.
    pub async fn request_as(
        &self,
        user: &TestUser,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(&user.token)).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn order_input(payment_method: PaymentMethod) -> CreateOrderInput {
    CreateOrderInput {
        payment_method,
        shipping_address: "Dormitory C, room 214, North Campus".to_string(),
        notes: None,
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

async fn seed_user(state: &AppState, name: &str, email: &str, role: UserRole) -> TestUser {
    let now = Utc::now();
    let account = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password("Password123").expect("hash password")),
        phone: Set(None),
        role: Set(role),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*state.db)
    .await
    .expect("seed user");

    let (token, _) = state
        .services
        .auth
        .generate_token(&account)
        .expect("issue token");

    TestUser {
        id: account.id,
        email: account.email,
        token,
    }
}
