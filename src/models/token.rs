//! Session token claims.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Discriminates access from refresh tokens signed with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Access token claims: standard claims plus the identity carried to other services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub token_type: TokenType,
    pub sub: String,
    pub user_id: String,
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub matricula: String,
    pub nome: String,
    pub campus: Option<String>,
    pub groups: Vec<String>,
}

/// Refresh token claims. Only good for minting new access tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub token_type: TokenType,
    pub sub: String,
    pub user_id: String,
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Token pair returned by both login paths.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Refresh request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Refresh response. `refresh` is present only when rotation is enabled.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// Logout request body.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh: Option<String>,
}
