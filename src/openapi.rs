use axum::{routing::get, Json, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_redoc::{Redoc, Servable};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, TokenResponse, UserResponse},
        handlers,
    },
    error::ErrorBody,
    health::{self, HealthResponse},
    state::AppState,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "authgate", description = "User registration and JWT bearer authentication"),
    paths(handlers::register, handlers::login, handlers::get_me, health::health),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        TokenResponse,
        UserResponse,
        HealthResponse,
        ErrorBody
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Authentication", description = "Register and log in"),
        (name = "Users", description = "The authenticated user"),
        (name = "System", description = "Liveness")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// `/openapi.json` plus rendered docs at `/docs` and `/redoc`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .merge(Redoc::with_url("/docs", ApiDoc::openapi()))
        .merge(Redoc::with_url("/redoc", ApiDoc::openapi()))
}
