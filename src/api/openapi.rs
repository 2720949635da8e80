//! OpenAPI documentation configuration.

use actix_web::{HttpResponse, get, web};
use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "IFSports Auth Service",
        version = "0.1.0",
        description = "SUAP single sign-on, local organizer login and the IFSports user directory"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Auth endpoints
        api::auth::suap_authorize,
        api::auth::suap_callback,
        api::auth::obtain_token,
        api::auth::refresh_token,
        api::auth::logout,
        // User endpoints
        api::users::current_user,
        api::users::get_user,
        api::users::validate_users,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Auth
            models::user::LoginRequest,
            models::TokenPair,
            models::token::RefreshRequest,
            models::token::RefreshResponse,
            models::token::LogoutRequest,
            // Users
            models::Role,
            models::UserResponse,
            models::user::ValidateUsersRequest,
            models::user::ValidateUsersResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "SUAP login, local login and session tokens"),
        (name = "Users", description = "User directory queries")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add bearer token security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serve the OpenAPI document.
#[get("/openapi.json")]
pub async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Configure the OpenAPI route.
pub fn configure_openapi_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(openapi_json);
}
