//! Session token minting and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with one shared secret and
//! told apart by the `token_type` claim. Refresh tokens can be blacklisted by
//! `jti` once rotated, when rotation and blacklisting are both enabled.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::JwtSettings;
use crate::db::{TokenBlacklist, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{AccessClaims, RefreshClaims, TokenPair, TokenType, User};
use crate::models::token::RefreshResponse;

/// Signs and verifies session tokens. Immutable once built.
#[derive(Clone)]
pub struct TokenIssuer {
    settings: JwtSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(settings: &JwtSettings) -> Self {
        let secret = settings.signing_key.expose_secret().as_bytes();
        Self {
            settings: settings.clone(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn settings(&self) -> &JwtSettings {
        &self.settings
    }

    /// Mint an access/refresh pair for `user` at the current time.
    pub fn issue(&self, user: &User) -> AppResult<TokenPair> {
        self.issue_at(user, Utc::now())
    }

    /// Mint a pair as of `now`. Claims are fully assembled before signing.
    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> AppResult<TokenPair> {
        let access = self.sign(&self.access_claims(user, now))?;
        let refresh = self.sign(&self.refresh_claims(user, now))?;
        Ok(TokenPair { access, refresh })
    }

    fn access_claims(&self, user: &User, now: DateTime<Utc>) -> AccessClaims {
        let user_id = user.id.to_string();
        AccessClaims {
            token_type: TokenType::Access,
            sub: user_id.clone(),
            user_id,
            jti: Uuid::new_v4().simple().to_string(),
            iss: self.settings.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at(now, self.settings.access_ttl_secs),
            matricula: user.matricula.clone(),
            nome: user.nome.clone(),
            campus: user.campus.clone(),
            groups: user.group_names(),
        }
    }

    fn refresh_claims(&self, user: &User, now: DateTime<Utc>) -> RefreshClaims {
        let user_id = user.id.to_string();
        RefreshClaims {
            token_type: TokenType::Refresh,
            sub: user_id.clone(),
            user_id,
            jti: Uuid::new_v4().simple().to_string(),
            iss: self.settings.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at(now, self.settings.refresh_ttl_secs),
        }
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> AppResult<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.settings.issuer.as_str()]);
        validation.validate_aud = false;
        validation.leeway = 0;

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
    }

    /// Verify an access token and return its claims.
    pub fn verify_access(&self, token: &str) -> AppResult<AccessClaims> {
        let claims: AccessClaims = self.decode(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Token is not an access token".to_string()));
        }
        Ok(claims)
    }

    /// Verify a refresh token, consulting the blacklist when blacklisting is enabled.
    pub async fn verify_refresh(
        &self,
        token: &str,
        blacklist: &dyn TokenBlacklist,
    ) -> AppResult<RefreshClaims> {
        let claims: RefreshClaims = self.decode(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AppError::Unauthorized("Token is not a refresh token".to_string()));
        }

        if self.settings.blacklist_enabled() && blacklist.is_blacklisted(&claims.jti).await? {
            warn!(jti = %claims.jti, "Rejected blacklisted refresh token");
            return Err(AppError::Unauthorized("Token is blacklisted".to_string()));
        }

        Ok(claims)
    }

    /// Exchange a refresh token for a new access token (and a new refresh token on rotation).
    pub async fn refresh(
        &self,
        token: &str,
        store: &dyn UserStore,
        blacklist: &dyn TokenBlacklist,
    ) -> AppResult<RefreshResponse> {
        let claims = self.verify_refresh(token, blacklist).await?;
        let user_id = Uuid::parse_str(&claims.user_id)
            .map_err(|_| AppError::Unauthorized("Malformed token subject".to_string()))?;

        let user = store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;
        if !user.is_active {
            return Err(AppError::Unauthorized("User is inactive".to_string()));
        }

        let now = Utc::now();
        let access = self.sign(&self.access_claims(&user, now))?;

        if !self.settings.rotate_refresh_tokens {
            return Ok(RefreshResponse {
                access,
                refresh: None,
            });
        }

        let refresh = self.sign(&self.refresh_claims(&user, now))?;
        if self.settings.blacklist_after_rotation {
            self.blacklist_claims(&claims, blacklist).await?;
        }
        info!(user_id = %user.id, "Rotated refresh token");

        Ok(RefreshResponse {
            access,
            refresh: Some(refresh),
        })
    }

    /// Blacklist a refresh token owned by `owner`. Returns whether it was blacklisted;
    /// a no-op unless rotation and blacklisting are both enabled.
    pub async fn revoke(
        &self,
        token: &str,
        owner: Uuid,
        blacklist: &dyn TokenBlacklist,
    ) -> AppResult<bool> {
        if !self.settings.blacklist_enabled() {
            return Ok(false);
        }

        let claims = self.verify_refresh(token, blacklist).await?;
        if claims.user_id != owner.to_string() {
            return Err(AppError::Forbidden(
                "Refresh token belongs to another user".to_string(),
            ));
        }

        self.blacklist_claims(&claims, blacklist).await?;
        Ok(true)
    }

    async fn blacklist_claims(
        &self,
        claims: &RefreshClaims,
        blacklist: &dyn TokenBlacklist,
    ) -> AppResult<()> {
        let user_id = Uuid::parse_str(&claims.user_id)?;
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
        blacklist.blacklist(&claims.jti, user_id, expires_at).await
    }
}

/// Expiry timestamp `ttl_secs` after `now`, saturating instead of wrapping.
fn expires_at(now: DateTime<Utc>, ttl_secs: u64) -> i64 {
    i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .timestamp()
}
