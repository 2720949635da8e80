//! Local matricula/password authentication (organizer accounts).

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::db::UserStore;
use crate::error::{AppError, AppResult};
use crate::models::User;

/// Outcome of a credential check.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult {
    Success(User),
    /// Correct password on a deactivated account
    Disabled(User),
    /// Unknown matricula or wrong password
    Invalid,
}

/// Checks matricula/password pairs against the stored Argon2 hashes.
#[derive(Clone)]
pub struct CredentialAuthenticator {
    store: Arc<dyn UserStore>,
    /// Verified against when the matricula is unknown, to keep timing uniform.
    dummy_hash: Arc<str>,
}

impl CredentialAuthenticator {
    pub fn new(store: Arc<dyn UserStore>) -> AppResult<Self> {
        let dummy_hash = hash_password("ifsports-timing-equalizer")?;
        Ok(Self {
            store,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    pub async fn authenticate(&self, matricula: &str, password: &str) -> AppResult<AuthResult> {
        let matricula = matricula.trim();
        let found = self.store.find_credentials(matricula).await?;

        let (user, stored_hash) = match found {
            Some((user, hash)) => (Some(user), hash),
            None => (None, self.dummy_hash.to_string()),
        };

        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?;

        match user {
            Some(user) if verified && user.is_active => {
                info!(matricula = %user.matricula, "Credential login succeeded");
                Ok(AuthResult::Success(user))
            }
            Some(user) if verified => {
                warn!(matricula = %user.matricula, "Credential login on disabled account");
                Ok(AuthResult::Disabled(user))
            }
            _ => {
                warn!(matricula, "Credential login rejected");
                Ok(AuthResult::Invalid)
            }
        }
    }
}
