//! Business logic services.

pub mod audit;
pub mod credentials;
pub mod directory;
pub mod provisioning;
pub mod reconciler;
pub mod suap_oauth;
pub mod token_issuer;

pub use audit::{AmqpTransport, AuditPublisher, BrokerTransport};
pub use credentials::{AuthResult, CredentialAuthenticator};
pub use reconciler::IdentityReconciler;
pub use suap_oauth::OAuthExchangeOrchestrator;
pub use token_issuer::TokenIssuer;
