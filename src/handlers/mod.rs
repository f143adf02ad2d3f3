pub mod auth;
pub mod commerce;
pub mod common;
pub mod orders;

use crate::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        commerce::{CartService, CatalogService, CheckoutService},
        orders::OrderLedger,
        payments::{PaymentGateway, SimulatedPaymentGateway},
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    /// Wires every service around a shared pool, event channel and payment gateway.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            AuthConfig::from(config),
            db_pool.clone(),
        ));
        let catalog = Arc::new(CatalogService::new(db_pool.clone(), event_sender.clone()));
        let cart = Arc::new(CartService::new(db_pool.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db_pool,
            event_sender,
            gateway,
            OrderLedger::new(config.order_number_max_attempts),
        ));

        Self {
            auth,
            catalog,
            cart,
            checkout,
        }
    }

    /// Same as [`AppServices::new`] with the simulated gateway tuned from config.
    pub fn from_config(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        let (min_latency, max_latency) = config.payment_latency();
        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(SimulatedPaymentGateway::new(min_latency, max_latency));
        Self::new(db_pool, event_sender, config, gateway)
    }
}
