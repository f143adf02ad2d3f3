use crate::{
    auth::AuthRouterExt,
    errors::ServiceError,
    handlers::common::{created_response, validate_input, PaginationParams},
    services::commerce::catalog_service::{
        CategoryResponse, CreateCategoryInput, UpdateCategoryInput,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Router,
};
use uuid::Uuid;

pub fn categories_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/categories",
            get(list_categories).merge(post(create_category).with_admin()),
        )
        .route(
            "/categories/:id",
            get(get_category).merge(
                patch(update_category)
                    .merge(delete(deactivate_category))
                    .with_admin(),
            ),
        )
        .route(
            "/categories/:id/activate",
            patch(activate_category).with_admin(),
        )
}

/// Active categories in alphabetical order
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    params(PaginationParams),
    responses((status = 200, description = "Active categories", body = ApiResponse<Vec<CategoryResponse>>)),
    tag = "categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Vec<CategoryResponse>> {
    let categories = state
        .services
        .catalog
        .list_categories(page.limit(), page.offset())
        .await?;
    Ok(Json(ApiResponse::success(categories)))
}

/// Create a category (admin only)
#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CreateCategoryInput,
    responses(
        (status = 201, description = "Category created", body = ApiResponse<CategoryResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<ApiResponse<CategoryResponse>>), ServiceError> {
    validate_input(&payload)?;
    let category = state.services.catalog.create_category(payload).await?;
    Ok(created_response(category))
}

/// Fetch a category by id, slug or name
#[utoipa::path(
    get,
    path = "/api/v1/categories/{id}",
    params(("id" = String, Path, description = "Category id, slug or name")),
    responses(
        (status = 200, description = "Category", body = ApiResponse<CategoryResponse>),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
    ),
    tag = "categories"
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(term): Path<String>,
) -> ApiResult<CategoryResponse> {
    let category = state.services.catalog.get_category(&term).await?;
    Ok(Json(ApiResponse::success(category)))
}

/// Rename or re-describe a category (admin only)
#[utoipa::path(
    patch,
    path = "/api/v1/categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    request_body = UpdateCategoryInput,
    responses(
        (status = 200, description = "Category updated", body = ApiResponse<CategoryResponse>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already taken", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryInput>,
) -> ApiResult<CategoryResponse> {
    validate_input(&payload)?;
    let category = state.services.catalog.update_category(id, payload).await?;
    Ok(Json(ApiResponse::success(category)))
}

/// Re-enable a deactivated category (admin only)
#[utoipa::path(
    patch,
    path = "/api/v1/categories/{id}/activate",
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category active", body = ApiResponse<CategoryResponse>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn activate_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CategoryResponse> {
    let category = state
        .services
        .catalog
        .set_category_active(id, true)
        .await?;
    let message = format!("Category \"{}\" activated", category.name);
    Ok(Json(ApiResponse::success(category).with_message(message)))
}

/// Soft-delete a category by deactivating it (admin only)
#[utoipa::path(
    delete,
    path = "/api/v1/categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category deactivated", body = ApiResponse<CategoryResponse>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "categories"
)]
pub async fn deactivate_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CategoryResponse> {
    let category = state
        .services
        .catalog
        .set_category_active(id, false)
        .await?;
    let message = format!("Category \"{}\" deactivated", category.name);
    Ok(Json(ApiResponse::success(category).with_message(message)))
}
