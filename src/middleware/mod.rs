//! HTTP middleware.

mod request_logger;
mod trusted_origins;

pub use request_logger::RequestLogger;
pub use trusted_origins::TrustedOrigins;
