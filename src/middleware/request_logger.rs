//! Request logging middleware.
//!
//! Query strings are not logged: the OAuth callback carries the authorization code there.

use std::future::{Ready, ready};
use std::rc::Rc;
use std::time::{Duration, Instant};

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::StatusCode;
use futures_util::future::LocalBoxFuture;
use tracing::{error, info, warn};

/// Request logger middleware factory.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: Rc<S>,
}

/// What gets logged about one request, captured before it is handed on.
struct RequestLine {
    method: String,
    path: String,
    client: String,
    user_agent: String,
    /// Lowercased scheme of the `Authorization` header; the credential is never kept.
    auth: String,
}

impl RequestLine {
    fn capture(req: &ServiceRequest) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            method: req.method().to_string(),
            path: req.path().to_string(),
            client: req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string(),
            user_agent: header("user-agent").unwrap_or_else(|| "unknown".to_string()),
            auth: header("authorization")
                .and_then(|v| v.split_whitespace().next().map(str::to_lowercase))
                .unwrap_or_else(|| "none".to_string()),
        }
    }

    fn started(&self) {
        info!(
            target: "api",
            method = %self.method,
            path = %self.path,
            remote_addr = %self.client,
            user_agent = %self.user_agent,
            auth = %self.auth,
            "→ Request started"
        );
    }

    fn finished(&self, status: StatusCode, elapsed: Duration) {
        let status_code = status.as_u16();
        let duration_ms = elapsed.as_millis() as u64;

        if status.is_server_error() {
            error!(target: "api", method = %self.method, path = %self.path, status = status_code, duration_ms, "← Server error");
        } else if status.is_client_error() {
            warn!(target: "api", method = %self.method, path = %self.path, status = status_code, duration_ms, "← Client error");
        } else {
            // 2xx and the OAuth redirects
            info!(target: "api", method = %self.method, path = %self.path, status = status_code, duration_ms, "← Request completed");
        }
    }
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let line = RequestLine::capture(&req);
        line.started();

        let start = Instant::now();
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let res = service.call(req).await?;
            line.finished(res.status(), start.elapsed());
            Ok(res)
        })
    }
}
