use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::common::{created_response, validate_input, PaginationParams},
    services::commerce::catalog_service::{CreateProductInput, ProductResponse, UpdateProductInput},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Router,
};
use uuid::Uuid;

/// Product routes. Reads are public; writes need a bearer token.
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/products",
            get(list_products).merge(post(create_product).with_auth()),
        )
        .route("/products/mine", get(list_my_products).with_auth())
        .route(
            "/products/:id",
            get(get_product).merge(
                patch(update_product)
                    .merge(delete(delete_product))
                    .with_auth(),
            ),
        )
}

/// List active products, newest first
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(PaginationParams),
    responses((status = 200, description = "Active products", body = ApiResponse<Vec<ProductResponse>>)),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Vec<ProductResponse>> {
    let products = state
        .services
        .catalog
        .list_products(page.limit(), page.offset())
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Publish a listing as the caller
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid product data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slug already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    validate_input(&payload)?;
    let product = state
        .services
        .catalog
        .create_product(user.user_id, payload)
        .await?;
    Ok(created_response(product))
}

/// The caller's own listings, including sold and paused ones
#[utoipa::path(
    get,
    path = "/api/v1/products/mine",
    params(PaginationParams),
    responses((status = 200, description = "Seller listings", body = ApiResponse<Vec<ProductResponse>>)),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn list_my_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Vec<ProductResponse>> {
    let products = state
        .services
        .catalog
        .list_by_seller(user.user_id, page.limit(), page.offset())
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Fetch a product by id or slug
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = String, Path, description = "Product id or slug")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(term): Path<String>,
) -> ApiResult<ProductResponse> {
    let product = state.services.catalog.get_product(&term).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Edit one of the caller's listings
#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductInput,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductResponse>),
        (status = 403, description = "Not the seller", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> ApiResult<ProductResponse> {
    validate_input(&payload)?;
    let product = state
        .services
        .catalog
        .update_product(user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Remove a listing (seller or admin)
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deleted", body = ApiResponse<ProductResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Neither the seller nor an admin", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductResponse> {
    let product = state
        .services
        .catalog
        .delete_product(user.user_id, user.is_admin(), id)
        .await?;
    Ok(Json(
        ApiResponse::success(product).with_message("Product deleted"),
    ))
}
