use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::{created_response, validate_input, PaginationParams},
    services::{
        commerce::checkout_service::{CreateOrderInput, UpdateOrderStatusInput},
        orders::OrderResponse,
        payments::PaymentDetails,
    },
    ApiResponse, ApiResult, AppState,
};

/// Checkout and order lifecycle routes. All require a bearer token.
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_my_orders))
        .route("/orders/sales", get(list_my_sales))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/pay", post(pay_order))
        .route("/orders/:id/cancel", patch(cancel_order))
        .route("/orders/:id/status", patch(update_order_status))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Checkout",
    description = "Turn the caller's cart into a pending order. Stock is not reserved until payment.",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Empty cart or invalid shipping data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 422, description = "A product is sold, paused or short on stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    validate_input(&request)?;
    let order = state
        .services
        .checkout
        .create_order(user.user_id, request)
        .await?;
    Ok(created_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "My orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders placed by the caller, newest first", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state
        .services
        .checkout
        .list_buyer_orders(user.user_id, page.limit(), page.offset())
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/sales",
    summary = "My sales",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders containing the caller's products", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_my_sales(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Vec<OrderResponse>> {
    let orders = state
        .services
        .checkout
        .list_seller_sales(user.user_id, page.limit(), page.offset())
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Not the buyer, a seller or an admin", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .checkout
        .get_order(user.user_id, user.is_admin(), id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/pay",
    summary = "Pay order",
    description = "Re-check availability, charge the payment method and commit stock.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = PaymentDetails,
    responses(
        (status = 200, description = "Order paid", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Missing or invalid card details", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment declined", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the buyer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already processed", body = crate::errors::ErrorResponse),
        (status = 422, description = "Stock no longer available", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn pay_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(details): Json<PaymentDetails>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .checkout
        .pay_order(user.user_id, id, details)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Buyer cancellation. Paid or shipped orders return their stock.",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Already delivered or cancelled", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the buyer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order changed concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .checkout
        .cancel_order(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    summary = "Update fulfilment status",
    description = "Seller-only. Allowed moves: paid to shipped, shipped to delivered, and cancel before delivery.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusInput,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a seller of this order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusInput>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .checkout
        .update_status(user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
