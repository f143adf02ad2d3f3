//! Campus Market API Library
//!
//! Marketplace backend for university students: catalog, cart, checkout and a
//! simulated payment gateway. The binary and the integration tests build the
//! same router from [`app_router`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Extension, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api/v1` route. Catalog reads and auth are public; the rest
/// authenticate through the `AuthUser` extractor or `with_auth` layers.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .merge(handlers::auth::auth_routes())
        // Catalog
        .merge(handlers::commerce::categories_routes())
        .merge(handlers::commerce::products_routes())
        // Cart and checkout
        .merge(handlers::commerce::carts_routes())
        .merge(handlers::orders::orders_routes())
}

/// Full application router: health, `/api/v1`, Swagger UI, request ids and HTTP tracing.
///
/// CORS and compression are left to the binary.
pub fn app_router(state: AppState) -> Router {
    let auth_service = state.services.auth.clone();

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(Extension(auth_service))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

/// Body of `GET /api/v1/status`
#[derive(Serialize, ToSchema)]
pub struct ServiceStatus {
    pub status: String,
    pub version: String,
    pub service: String,
    pub environment: String,
    pub timestamp: String,
}

/// Body of `GET /health`
#[derive(Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub timestamp: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses((status = 200, description = "Service metadata", body = ApiResponse<ServiceStatus>)),
    tag = "Health"
)]
async fn api_status(State(state): State<AppState>) -> ApiResult<ServiceStatus> {
    Ok(Json(ApiResponse::success(ServiceStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "campus-market-api".to_string(),
        environment: state.config.environment.clone(),
        timestamp: Utc::now().to_rfc3339(),
    })))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Database reachability", body = ApiResponse<HealthStatus>)),
    tag = "Health"
)]
async fn health_check(State(state): State<AppState>) -> ApiResult<HealthStatus> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    Ok(Json(ApiResponse::success(HealthStatus {
        status: db_status.to_string(),
        database: db_status.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })))
}
