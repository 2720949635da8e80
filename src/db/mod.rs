//! Database module providing connection management, migrations and the identity store.
//!
//! Handlers and services depend on the [`UserStore`] and [`TokenBlacklist`]
//! traits. [`users::SeaOrmUserStore`] backs them with PostgreSQL;
//! [`memory::MemoryUserStore`] keeps everything in process.

pub mod memory;
pub mod token_blacklist;
pub mod users;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppResult;
use crate::migration::Migrator;
use crate::models::{NewUser, ProfileFields, Role, User};

pub use memory::MemoryUserStore;
pub use users::SeaOrmUserStore;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using the configured database settings.
    pub async fn new(config: &Config) -> AppResult<Self> {
        let mut opts = ConnectOptions::new(config.database.url.clone());
        opts.max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(opts).await?;
        Ok(DbPool { conn })
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None).await?;
        Ok(())
    }
}

/// Keyed identity store. `matricula` is unique at the storage layer.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create or overwrite the provider attributes of the user keyed by `matricula`,
    /// atomically. Never touches roles, staff flags or the password of an existing
    /// user. Returns the stored user and whether it was created.
    async fn upsert_profile(&self, matricula: &str, profile: &ProfileFields)
    -> AppResult<(User, bool)>;

    /// Add a role membership (no-op when already a member).
    /// Fails with `AppError::NotFound` when the role catalog lacks the role.
    async fn add_role(&self, user_id: Uuid, role: Role) -> AppResult<()>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn find_by_matricula(&self, matricula: &str) -> AppResult<Option<User>>;

    /// User and stored password hash, for local authentication.
    async fn find_credentials(&self, matricula: &str) -> AppResult<Option<(User, String)>>;

    /// Subset of `matriculas` that exist in the store.
    async fn existing_matriculas(&self, matriculas: &[String]) -> AppResult<HashSet<String>>;

    /// Administrative creation (organizers). Fails when the matricula exists.
    async fn create(&self, new_user: NewUser) -> AppResult<User>;

    /// Stamp `last_login_at` with the current time.
    async fn record_login(&self, id: Uuid) -> AppResult<()>;

    /// Cheap round trip proving the backing store is reachable.
    async fn ping(&self) -> AppResult<()>;
}

/// Revoked refresh token identifiers.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    async fn blacklist(&self, jti: &str, user_id: Uuid, expires_at: DateTime<Utc>)
    -> AppResult<()>;

    async fn is_blacklisted(&self, jti: &str) -> AppResult<bool>;
}
