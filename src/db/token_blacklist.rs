//! Refresh token blacklist persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::*;
use uuid::Uuid;

use super::{SeaOrmUserStore, TokenBlacklist};
use crate::entity::token_blacklist;
use crate::error::AppResult;

#[async_trait]
impl TokenBlacklist for SeaOrmUserStore {
    async fn blacklist(&self, jti: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<()> {
        let db = self.connection();

        let exists = token_blacklist::Entity::find_by_id(jti.to_string())
            .one(db)
            .await?
            .is_some();
        if exists {
            return Ok(());
        }

        let model = token_blacklist::ActiveModel {
            jti: Set(jti.to_string()),
            user_id: Set(user_id),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
        };
        token_blacklist::Entity::insert(model).exec(db).await?;

        Ok(())
    }

    async fn is_blacklisted(&self, jti: &str) -> AppResult<bool> {
        let found = token_blacklist::Entity::find_by_id(jti.to_string())
            .one(self.connection())
            .await?;
        Ok(found.is_some())
    }
}

impl SeaOrmUserStore {
    /// Drop blacklist rows whose token would have expired anyway.
    pub async fn purge_expired_blacklist(&self) -> AppResult<u64> {
        let result = token_blacklist::Entity::delete_many()
            .filter(token_blacklist::Column::ExpiresAt.lt(Utc::now()))
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected)
    }
}
