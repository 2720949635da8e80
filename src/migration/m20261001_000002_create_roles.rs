//! Migration: Create role catalog and memberships.
//!
//! Seeds the two well-known roles. Memberships reference the catalog, so a
//! missing catalog row rejects the membership instead of inventing a role.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE roles (
                    name VARCHAR(150) PRIMARY KEY
                );

                INSERT INTO roles (name) VALUES ('Organizador'), ('Jogador')
                    ON CONFLICT (name) DO NOTHING;

                CREATE TABLE user_roles (
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role VARCHAR(150) NOT NULL REFERENCES roles(name),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    PRIMARY KEY (user_id, role)
                );

                CREATE INDEX idx_user_roles_role ON user_roles(role);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TABLE IF EXISTS user_roles CASCADE;
                DROP TABLE IF EXISTS roles CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
