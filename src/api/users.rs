//! User directory endpoints. All require a bearer access token.

use actix_web::{HttpResponse, get, post, web};

use crate::auth::BearerAuth;
use crate::error::{AppError, AppResult};
use crate::models::UserResponse;
use crate::models::user::{ValidateUsersRequest, ValidateUsersResponse};
use crate::services::directory;
use crate::state::AppState;

/// Configure user routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Registered before `/users/{matricula}` so the literal path wins
    cfg.service(validate_users)
        .service(current_user)
        .service(get_user);
}

/// Current user, as stored (not as carried by the token).
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[get("/users/me")]
pub async fn current_user(auth: BearerAuth, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let user = state
        .store
        .find_by_id(auth.user_id()?)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Look a user up by matricula.
#[utoipa::path(
    get,
    path = "/api/v1/users/{matricula}",
    tag = "Users",
    params(("matricula" = String, Path, description = "SUAP registration number")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = []))
)]
#[get("/users/{matricula}")]
pub async fn get_user(
    _auth: BearerAuth,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let matricula = path.into_inner();
    let user = state
        .store
        .find_by_matricula(matricula.trim())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{}'", matricula)))?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/// Check that every listed matricula exists.
///
/// Answers 200 when all exist (or the list is empty) and 400 otherwise; the
/// body has the same shape in both cases.
#[utoipa::path(
    post,
    path = "/api/v1/users/validate",
    tag = "Users",
    request_body = ValidateUsersRequest,
    responses(
        (status = 200, description = "All users exist", body = ValidateUsersResponse),
        (status = 400, description = "Some users do not exist", body = ValidateUsersResponse)
    ),
    security(("bearer" = []))
)]
#[post("/users/validate")]
pub async fn validate_users(
    _auth: BearerAuth,
    body: web::Json<ValidateUsersRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let result = directory::validate_users(state.store.as_ref(), &body.user_ids).await?;

    if result.all_exist {
        Ok(HttpResponse::Ok().json(result))
    } else {
        Ok(HttpResponse::BadRequest().json(result))
    }
}
