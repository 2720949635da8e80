//! SUAP OAuth2 authorization-code exchange.
//!
//! Flow for one callback:
//! 1. Exchange the code for a SUAP access token (fatal on failure)
//! 2. Fetch `/api/eu` and `/api/rh/meus-dados` concurrently (each may fail alone)
//! 3. Merge both payloads through the [`ProfilePrecedence`] table
//! 4. Reconcile the local user, issue a token pair, emit `auth.login`
//!
//! Every outcome ends in a browser redirect to the frontend, carrying either
//! the tokens or an `error` code.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{FrontendSettings, SuapSettings};
use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{
    AuditAction, AuditEvent, ProfilePayload, ProfilePrecedence, ProviderProfiles, TokenPair,
    User,
};
use crate::services::audit::AuditPublisher;
use crate::services::reconciler::IdentityReconciler;
use crate::services::token_issuer::TokenIssuer;

/// HTTP connect timeout for SUAP calls.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Total timeout for the code exchange.
pub const TOKEN_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);
/// Total timeout for each profile fetch.
pub const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures that abort a callback. Each maps to the `error` query parameter
/// of the frontend redirect.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Callback received no authorization code")]
    MissingCode,

    #[error("SUAP denied authorization: {0}")]
    AccessDenied(String),

    #[error("SUAP code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Both SUAP profile endpoints failed")]
    ProfileUnavailable,

    #[error("SUAP profile carries no matricula")]
    IncompleteIdentity,

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl OAuthError {
    /// Machine code sent to the frontend.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCode => "missing_code",
            Self::AccessDenied(_) => "access_denied",
            Self::ExchangeFailed(_) => "suap_exchange_failed",
            Self::ProfileUnavailable => "suap_profile_unavailable",
            Self::IncompleteIdentity => "incomplete_identity",
            Self::Internal(_) => "server_error",
        }
    }
}

/// Query string of the callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Thin client over the SUAP OAuth and profile endpoints.
#[derive(Clone)]
pub struct SuapClient {
    http: reqwest::Client,
    settings: SuapSettings,
}

impl SuapClient {
    pub fn new(settings: SuapSettings) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client for SUAP: {}", e)))?;
        Ok(Self { http, settings })
    }

    /// Provider authorize URL the browser is sent to.
    pub fn authorize_redirect_url(&self) -> String {
        let mut url = format!(
            "{}?response_type=code&client_id={}&scope={}",
            self.settings.authorize_url(),
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(SuapSettings::SCOPE),
        );
        if let Some(redirect_uri) = &self.settings.redirect_uri {
            url.push_str("&redirect_uri=");
            url.push_str(&urlencoding::encode(redirect_uri));
        }
        url
    }

    /// Exchange an authorization code for a SUAP access token.
    pub async fn exchange_code(&self, code: &str) -> Result<SecretString, OAuthError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.expose_secret()),
            ("scope", SuapSettings::SCOPE),
        ];
        if let Some(redirect_uri) = &self.settings.redirect_uri {
            form.push(("redirect_uri", redirect_uri.as_str()));
        }

        let response = self
            .http
            .post(self.settings.token_url())
            .header("Accept", "application/json")
            .timeout(TOKEN_EXCHANGE_TIMEOUT)
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::ExchangeFailed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(format!("unreadable token response: {}", e)))?;

        body.access_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| OAuthError::ExchangeFailed("no access_token in response".to_string()))
    }

    /// Fetch both profile endpoints concurrently. A failed fetch yields an empty payload.
    pub async fn fetch_profiles(&self, access_token: &SecretString) -> ProviderProfiles {
        let eu = tokio::spawn(fetch_profile(
            self.http.clone(),
            self.settings.profile_url(),
            access_token.clone(),
        ));
        let my_data = tokio::spawn(fetch_profile(
            self.http.clone(),
            self.settings.my_data_url(),
            access_token.clone(),
        ));

        let (eu, my_data) = tokio::join!(eu, my_data);

        ProviderProfiles {
            eu: settle("/api/eu", eu),
            my_data: settle("/api/rh/meus-dados", my_data),
        }
    }
}

async fn fetch_profile(
    http: reqwest::Client,
    url: String,
    access_token: SecretString,
) -> Result<ProfilePayload, String> {
    let response = http
        .get(&url)
        .bearer_auth(access_token.expose_secret())
        .header("Accept", "application/json")
        .timeout(PROFILE_FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("status {}", status));
    }

    response
        .json::<ProfilePayload>()
        .await
        .map_err(|e| format!("unreadable body: {}", e))
}

fn settle(
    endpoint: &str,
    joined: Result<Result<ProfilePayload, String>, tokio::task::JoinError>,
) -> ProfilePayload {
    match joined {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            warn!(endpoint, "SUAP profile fetch failed: {}", e);
            ProfilePayload::new()
        }
        Err(e) => {
            warn!(endpoint, "SUAP profile fetch task aborted: {}", e);
            ProfilePayload::new()
        }
    }
}

/// Successful callback.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub created: bool,
    pub tokens: TokenPair,
}

/// Drives a SUAP callback end to end.
#[derive(Clone)]
pub struct OAuthExchangeOrchestrator {
    suap: SuapClient,
    precedence: ProfilePrecedence,
    reconciler: IdentityReconciler,
    store: Arc<dyn UserStore>,
    issuer: Arc<TokenIssuer>,
    audit: AuditPublisher,
    frontend: FrontendSettings,
}

impl OAuthExchangeOrchestrator {
    pub fn new(
        suap: SuapClient,
        store: Arc<dyn UserStore>,
        issuer: Arc<TokenIssuer>,
        audit: AuditPublisher,
        frontend: FrontendSettings,
    ) -> Self {
        Self {
            suap,
            precedence: ProfilePrecedence::default(),
            reconciler: IdentityReconciler::new(store.clone()),
            store,
            issuer,
            audit,
            frontend,
        }
    }

    /// Replace the merge table.
    pub fn with_precedence(mut self, precedence: ProfilePrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn suap(&self) -> &SuapClient {
        &self.suap
    }

    /// Run the full exchange for one callback.
    pub async fn handle_callback(
        &self,
        query: &CallbackQuery,
        client_ip: Option<&str>,
    ) -> Result<LoginOutcome, OAuthError> {
        if let Some(error) = query.error.as_deref().filter(|e| !e.is_empty()) {
            return Err(OAuthError::AccessDenied(error.to_string()));
        }
        let code = query
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(OAuthError::MissingCode)?;

        let access_token = self.suap.exchange_code(code).await?;

        let profiles = self.suap.fetch_profiles(&access_token).await;
        if profiles.is_empty() {
            return Err(OAuthError::ProfileUnavailable);
        }

        let merged = self.precedence.merge(&profiles);
        let matricula = merged.matricula.ok_or(OAuthError::IncompleteIdentity)?;

        let (user, created) = self.reconciler.reconcile(&matricula, &merged.fields).await?;
        let tokens = self.issuer.issue(&user)?;

        if let Err(e) = self.store.record_login(user.id).await {
            warn!(matricula = %user.matricula, "Failed to record last login: {}", e);
        }

        self.audit.dispatch(
            AuditEvent::for_user(&user, AuditAction::Login, client_ip)
                .with_new_data("method", "suap")
                .with_new_data("user_created", created),
        );

        info!(matricula = %user.matricula, created, "SUAP login succeeded");

        Ok(LoginOutcome {
            user,
            created,
            tokens,
        })
    }

    /// Frontend URL carrying the token pair and display attributes.
    pub fn success_redirect(&self, outcome: &LoginOutcome) -> String {
        let params = [
            ("access", outcome.tokens.access.as_str()),
            ("refresh", outcome.tokens.refresh.as_str()),
            ("user_created", if outcome.created { "true" } else { "false" }),
            ("nome", outcome.user.nome.as_str()),
            ("email", outcome.user.email.as_deref().unwrap_or("")),
            ("foto", outcome.user.foto.as_deref().unwrap_or("")),
        ];
        with_query(&self.frontend.success_url(), &params)
    }

    /// Frontend URL carrying the error code.
    pub fn error_redirect(&self, error: &OAuthError) -> String {
        with_query(&self.frontend.error_url(), &[("error", error.code())])
    }
}

fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}
