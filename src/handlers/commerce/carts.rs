use crate::{
    auth::AuthUser,
    handlers::common::validate_input,
    services::commerce::cart_service::{AddToCartInput, CartTotal, CartView, UpdateCartItemInput},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, patch, post},
    Router,
};
use uuid::Uuid;

/// Creates the router for cart endpoints. Every route acts on the caller's own cart.
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/add", post(add_to_cart))
        .route("/cart/items/:item_id", patch(update_cart_item))
        .route("/cart/items/:item_id", delete(remove_cart_item))
        .route("/cart/clear", delete(clear_cart))
        .route("/cart/total", get(cart_total))
}

/// Get the caller's cart, creating it on first access
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart with live prices", body = ApiResponse<CartView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartView> {
    let cart = state.services.cart.get_or_create_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Add a product to the cart, incrementing an existing line
#[utoipa::path(
    post,
    path = "/api/v1/cart/add",
    request_body = AddToCartInput,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Product sold, paused or short on stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartInput>,
) -> ApiResult<CartView> {
    validate_input(&payload)?;
    let cart = state.services.cart.add_to_cart(user.user_id, payload).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Change a line's quantity
#[utoipa::path(
    patch,
    path = "/api/v1/cart/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Cart line id")),
    request_body = UpdateCartItemInput,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 404, description = "Line not in your cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemInput>,
) -> ApiResult<CartView> {
    validate_input(&payload)?;
    let cart = state
        .services
        .cart
        .update_cart_item(user.user_id, item_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Remove a line from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Cart line id")),
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<CartView>),
        (status = 404, description = "Line not in your cart", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> ApiResult<CartView> {
    let cart = state
        .services
        .cart
        .remove_cart_item(user.user_id, item_id)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Remove every line from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/clear",
    responses((status = 200, description = "Empty cart", body = ApiResponse<CartView>)),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartView> {
    let cart = state.services.cart.clear_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Live cart total and unit count
#[utoipa::path(
    get,
    path = "/api/v1/cart/total",
    responses((status = 200, description = "Cart total", body = ApiResponse<CartTotal>)),
    security(("Bearer" = [])),
    tag = "cart"
)]
pub async fn cart_total(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartTotal> {
    let total = state.services.cart.cart_total(user.user_id).await?;
    Ok(Json(ApiResponse::success(total)))
}
