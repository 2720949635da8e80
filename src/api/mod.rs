//! API endpoint modules.

pub mod auth;
pub mod health;
pub mod openapi;
pub mod users;

use actix_web::HttpRequest;

pub use auth::configure_routes as configure_auth_routes;
pub use health::configure_health_routes;
pub use openapi::{ApiDoc, configure_openapi_routes};
pub use users::configure_routes as configure_user_routes;

/// Client address as seen through proxies (`X-Forwarded-For`, `Forwarded`),
/// falling back to the peer address.
pub(crate) fn client_ip(req: &HttpRequest) -> Option<String> {
    let info = req.connection_info();
    info.realip_remote_addr().map(|addr| {
        // Peer addresses carry a port; forwarded ones usually do not
        match addr.parse::<std::net::SocketAddr>() {
            Ok(socket) => socket.ip().to_string(),
            Err(_) => addr.to_string(),
        }
    })
}
