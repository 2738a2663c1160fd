use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, TokenResponse, UserResponse},
        extractors::CurrentUser,
        jwt::JwtKeys,
        services,
    },
    error::{AppError, ErrorBody},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = TokenResponse),
        (status = 400, description = "Email already registered", body = ErrorBody)
    )
)]
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let res = services::register(
        state.users.as_ref(),
        &keys,
        &payload.email,
        &payload.password,
    )
    .await?;
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = TokenResponse),
        (status = 401, description = "Invalid email or password", body = ErrorBody)
    )
)]
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let res = services::login(
        state.users.as_ref(),
        &keys,
        &payload.email,
        &payload.password,
    )
    .await?;
    Ok(Json(res))
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The authenticated user", body = UserResponse),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody)
    )
)]
#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}
