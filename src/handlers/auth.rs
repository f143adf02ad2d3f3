use crate::{
    auth::{AuthRouterExt, AuthUser, LoginCredentials, RegisterRequest, TokenResponse, UserResponse},
    errors::ServiceError,
    handlers::common::{created_response, validate_input},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::info;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/profile", get(profile).with_auth())
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    summary = "Register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid registration data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ServiceError> {
    validate_input(&payload)?;
    let user = state.services.auth.register(payload).await?;
    info!(user_id = %user.id, "Account registered via API");
    Ok(created_response(user))
}

/// Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    summary = "Login",
    request_body = LoginCredentials,
    responses(
        (status = 200, description = "Authenticated", body = ApiResponse<TokenResponse>),
        (status = 400, description = "Malformed credentials", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginCredentials>,
) -> ApiResult<TokenResponse> {
    validate_input(&payload)?;
    let token = state.services.auth.login(payload).await?;
    Ok(Json(ApiResponse::success(token)))
}

/// The authenticated caller's account
#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    summary = "Profile",
    responses(
        (status = 200, description = "Current account", body = ApiResponse<UserResponse>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<UserResponse> {
    let account = state.services.auth.profile(user.user_id).await?;
    Ok(Json(ApiResponse::success(account)))
}
