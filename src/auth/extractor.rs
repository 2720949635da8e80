//! Actix-web extractor for bearer access tokens.

use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest, web};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::AccessClaims;
use crate::state::AppState;

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty())
}

/// Extractor that requires a valid access token.
///
/// ```ignore
/// async fn protected_handler(auth: BearerAuth) -> impl Responder {
///     // auth.claims holds the verified access token claims
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuth {
    pub claims: AccessClaims,
}

impl BearerAuth {
    /// Local user id carried by the token.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.claims.user_id)
            .map_err(|_| AppError::Unauthorized("Malformed token subject".to_string()))
    }
}

impl FromRequest for BearerAuth {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state,
            None => {
                return ready(Err(AppError::Internal(
                    "Application state not configured".to_string(),
                )));
            }
        };

        let token = match bearer_token(req) {
            Some(token) => token,
            None => {
                return ready(Err(AppError::Unauthorized(
                    "Missing bearer token. Provide an Authorization header.".to_string(),
                )));
            }
        };

        ready(
            state
                .issuer
                .verify_access(token)
                .map(|claims| BearerAuth { claims }),
        )
    }
}
