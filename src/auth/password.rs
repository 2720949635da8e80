//! Argon2 password hashing for local (organizer) accounts.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{AppError, AppResult};

/// Prefix marking a password that can never verify (SSO-only accounts).
pub const UNUSABLE_PASSWORD_PREFIX: char = '!';

/// Hash a password into an Argon2 PHC string.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a stored PHC string. Unusable or malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.starts_with(UNUSABLE_PASSWORD_PREFIX) {
        return false;
    }
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Placeholder stored for accounts created through SSO.
pub fn unusable_password() -> String {
    let random_bytes: [u8; 20] = rand::random();
    format!("{}{}", UNUSABLE_PASSWORD_PREFIX, hex::encode(random_bytes))
}
