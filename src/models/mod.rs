//! Domain models for the auth service.

pub mod audit;
pub mod profile;
pub mod token;
pub mod user;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEvent};
pub use profile::{MergedProfile, ProfilePayload, ProfilePrecedence, ProviderProfiles};
pub use token::{AccessClaims, RefreshClaims, TokenPair, TokenType};
pub use user::{NewUser, ProfileFields, Role, User, UserResponse};
