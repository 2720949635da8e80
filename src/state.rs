//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::config::Config;
use crate::db::{TokenBlacklist, UserStore};
use crate::error::AppResult;
use crate::services::audit::{AuditPublisher, BrokerTransport};
use crate::services::credentials::CredentialAuthenticator;
use crate::services::suap_oauth::{OAuthExchangeOrchestrator, SuapClient};
use crate::services::token_issuer::TokenIssuer;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn UserStore>,
    pub blacklist: Arc<dyn TokenBlacklist>,
    pub issuer: Arc<TokenIssuer>,
    pub audit: AuditPublisher,
    pub oauth: OAuthExchangeOrchestrator,
    pub credentials: CredentialAuthenticator,
}

impl AppState {
    /// Wire the services together. The broker transport is built by the caller
    /// so tests can substitute their own.
    pub fn new(
        config: Config,
        store: Arc<dyn UserStore>,
        blacklist: Arc<dyn TokenBlacklist>,
        transport: Arc<dyn BrokerTransport>,
    ) -> AppResult<Self> {
        Self::with_publisher(config, store, blacklist, AuditPublisher::new(transport))
    }

    pub fn with_publisher(
        config: Config,
        store: Arc<dyn UserStore>,
        blacklist: Arc<dyn TokenBlacklist>,
        audit: AuditPublisher,
    ) -> AppResult<Self> {
        let issuer = Arc::new(TokenIssuer::new(&config.jwt));
        let suap = SuapClient::new(config.suap.clone())?;
        let oauth = OAuthExchangeOrchestrator::new(
            suap,
            store.clone(),
            issuer.clone(),
            audit.clone(),
            config.frontend.clone(),
        );
        let credentials = CredentialAuthenticator::new(store.clone())?;

        Ok(Self {
            config: Arc::new(config),
            store,
            blacklist,
            issuer,
            audit,
            oauth,
            credentials,
        })
    }
}
