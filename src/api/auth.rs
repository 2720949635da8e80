//! Authentication endpoints.
//!
//! - GET  /auth/suap           Redirect the browser to SUAP
//! - GET  /auth/login          SUAP callback, redirects to the frontend with tokens or an error
//! - POST /auth/token          Local matricula/password login
//! - POST /auth/token/refresh  Refresh token exchange
//! - POST /auth/logout         Emit `auth.logout`, optionally blacklisting a refresh token

use actix_web::{HttpRequest, HttpResponse, get, http::header, post, web};
use serde_json::json;
use tracing::{error, info, warn};

use super::client_ip;
use crate::auth::BearerAuth;
use crate::error::{AppError, AppResult};
use crate::models::token::{LogoutRequest, RefreshRequest, RefreshResponse};
use crate::models::user::LoginRequest;
use crate::models::{AuditAction, AuditEvent, TokenPair};
use crate::services::credentials::AuthResult;
use crate::services::suap_oauth::{CallbackQuery, OAuthError};
use crate::state::AppState;

/// Configure authentication routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(suap_authorize)
        .service(suap_callback)
        .service(obtain_token)
        .service(refresh_token)
        .service(logout);
}

fn redirect(location: String) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

/// Redirect to the SUAP authorization page.
#[utoipa::path(
    get,
    path = "/api/v1/auth/suap",
    tag = "Auth",
    responses((status = 302, description = "Redirect to SUAP"))
)]
#[get("/auth/suap")]
pub async fn suap_authorize(state: web::Data<AppState>) -> HttpResponse {
    redirect(state.oauth.suap().authorize_redirect_url())
}

/// SUAP OAuth2 callback.
///
/// Always answers with a redirect to the frontend: the success path carries
/// the token pair, the error path carries an `error` code.
#[utoipa::path(
    get,
    path = "/api/v1/auth/login",
    tag = "Auth",
    params(
        ("code" = Option<String>, Query, description = "Authorization code issued by SUAP"),
        ("error" = Option<String>, Query, description = "Error reported by SUAP")
    ),
    responses((status = 302, description = "Redirect to the frontend"))
)]
#[get("/auth/login")]
pub async fn suap_callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let ip = client_ip(&req);

    match state.oauth.handle_callback(&query, ip.as_deref()).await {
        Ok(outcome) => redirect(state.oauth.success_redirect(&outcome)),
        Err(e) => {
            match &e {
                OAuthError::Internal(inner) => error!("SUAP callback failed: {}", inner),
                other => warn!(code = other.code(), "SUAP callback failed: {}", other),
            }
            redirect(state.oauth.error_redirect(&e))
        }
    }
}

/// Local login for accounts with a usable password (organizers).
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Missing credentials", body = crate::error::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 403, description = "Account disabled", body = crate::error::ErrorResponse)
    )
)]
#[post("/auth/token")]
pub async fn obtain_token(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    if body.matricula.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::InvalidInput(
            "matricula and password are required".to_string(),
        ));
    }

    let user = match state
        .credentials
        .authenticate(&body.matricula, &body.password)
        .await?
    {
        AuthResult::Success(user) => user,
        AuthResult::Disabled(_) => {
            return Err(AppError::Forbidden("User account is disabled".to_string()));
        }
        AuthResult::Invalid => {
            return Err(AppError::Unauthorized(
                "No active account found with the given credentials".to_string(),
            ));
        }
    };

    let tokens = state.issuer.issue(&user)?;

    if let Err(e) = state.store.record_login(user.id).await {
        warn!(matricula = %user.matricula, "Failed to record last login: {}", e);
    }

    let ip = client_ip(&req);
    state.audit.dispatch(
        AuditEvent::for_user(&user, AuditAction::Login, ip.as_deref())
            .with_new_data("method", "password"),
    );

    Ok(HttpResponse::Ok().json(tokens))
}

/// Exchange a refresh token for a new access token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Invalid, expired or blacklisted token", body = crate::error::ErrorResponse)
    )
)]
#[post("/auth/token/refresh")]
pub async fn refresh_token(
    body: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let response = state
        .issuer
        .refresh(&body.refresh, state.store.as_ref(), state.blacklist.as_ref())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Record a logout. When rotation and blacklisting are enabled, the given
/// refresh token is blacklisted as well.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "Missing or invalid access token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[post("/auth/logout")]
pub async fn logout(
    req: HttpRequest,
    auth: BearerAuth,
    body: Option<web::Json<LogoutRequest>>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let user_id = auth.user_id()?;
    let user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    let mut revoked = false;
    if let Some(refresh) = body.and_then(|b| b.into_inner().refresh) {
        match state
            .issuer
            .revoke(&refresh, user.id, state.blacklist.as_ref())
            .await
        {
            Ok(done) => revoked = done,
            Err(AppError::Unauthorized(reason)) => {
                warn!(matricula = %user.matricula, "Ignoring unusable refresh token on logout: {}", reason);
            }
            Err(e) => return Err(e),
        }
    }

    let ip = client_ip(&req);
    state.audit.dispatch(
        AuditEvent::for_user(&user, AuditAction::Logout, ip.as_deref())
            .with_new_data("refresh_revoked", revoked),
    );

    info!(matricula = %user.matricula, revoked, "User logged out");
    Ok(HttpResponse::Ok().json(json!({ "message": "Logged out", "refresh_revoked": revoked })))
}
