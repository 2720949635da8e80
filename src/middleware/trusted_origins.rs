//! Origin check for state-changing requests.
//!
//! Browsers always send `Origin` on cross-site POSTs. A request whose `Origin`
//! is present but not in the trusted list is refused with 403 before it
//! reaches a handler. Requests without `Origin` (server-to-server calls) pass.

use std::future::{Ready, ready};
use std::rc::Rc;

use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::{Method, header};
use actix_web::{Error, ResponseError};
use futures_util::future::LocalBoxFuture;
use tracing::warn;

use crate::error::AppError;

/// Trusted-origin middleware factory.
#[derive(Clone)]
pub struct TrustedOrigins {
    origins: Rc<Vec<String>>,
}

impl TrustedOrigins {
    pub fn new(origins: Vec<String>) -> Self {
        Self {
            origins: Rc::new(
                origins
                    .into_iter()
                    .map(|o| o.trim_end_matches('/').to_string())
                    .collect(),
            ),
        }
    }
}

fn is_state_changing(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

impl<S, B> Transform<S, ServiceRequest> for TrustedOrigins
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = TrustedOriginsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TrustedOriginsMiddleware {
            service,
            origins: self.origins.clone(),
        }))
    }
}

/// Trusted-origin middleware service.
pub struct TrustedOriginsMiddleware<S> {
    service: S,
    origins: Rc<Vec<String>>,
}

impl<S, B> Service<ServiceRequest> for TrustedOriginsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let untrusted = if is_state_changing(req.method()) {
            req.headers()
                .get(header::ORIGIN)
                .map(|v| v.to_str().unwrap_or_default().trim_end_matches('/'))
                .filter(|origin| !self.origins.iter().any(|t| t.as_str() == *origin))
                .map(str::to_string)
        } else {
            None
        };

        if let Some(origin) = untrusted {
            warn!(
                method = %req.method(),
                path = %req.path(),
                origin = %origin,
                "Rejected request from untrusted origin"
            );
            let response = AppError::Forbidden("Origin not trusted".to_string()).error_response();
            return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
        }

        let fut = self.service.call(req);
        Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
    }
}
