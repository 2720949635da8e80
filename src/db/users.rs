//! Database operations for users and role memberships.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use uuid::Uuid;

use super::{DbPool, UserStore};
use crate::auth::password::unusable_password;
use crate::entity::{role, user, user_role};
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, ProfileFields, Role, User};

/// PostgreSQL-backed [`UserStore`].
#[derive(Clone)]
pub struct SeaOrmUserStore {
    pool: DbPool,
}

impl SeaOrmUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(super) fn connection(&self) -> &DatabaseConnection {
        self.pool.connection()
    }
}

#[async_trait]
impl UserStore for SeaOrmUserStore {
    async fn upsert_profile(
        &self,
        matricula: &str,
        profile: &ProfileFields,
    ) -> AppResult<(User, bool)> {
        let txn = self.pool.connection().begin().await?;

        let now = Utc::now();
        let new_id = Uuid::new_v4();
        let mut active = user::ActiveModel {
            id: Set(new_id),
            matricula: Set(matricula.to_string()),
            password: Set(unusable_password()),
            is_active: Set(true),
            is_staff: Set(false),
            is_superuser: Set(false),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        apply_profile(&mut active, profile);

        let model = profile_upsert(active).exec_with_returning(&txn).await?;
        let created = model.id == new_id;

        let groups = load_roles(&txn, model.id).await?;
        txn.commit().await?;

        Ok((model_to_user(model, groups), created))
    }

    async fn add_role(&self, user_id: Uuid, role: Role) -> AppResult<()> {
        insert_membership(self.pool.connection(), user_id, role).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let db = self.pool.connection();
        match user::Entity::find_by_id(id).one(db).await? {
            Some(m) => {
                let groups = load_roles(db, m.id).await?;
                Ok(Some(model_to_user(m, groups)))
            }
            None => Ok(None),
        }
    }

    async fn find_by_matricula(&self, matricula: &str) -> AppResult<Option<User>> {
        Ok(self
            .find_credentials(matricula)
            .await?
            .map(|(user, _)| user))
    }

    async fn find_credentials(&self, matricula: &str) -> AppResult<Option<(User, String)>> {
        let db = self.pool.connection();
        let found = user::Entity::find()
            .filter(user::Column::Matricula.eq(matricula))
            .one(db)
            .await?;

        match found {
            Some(m) => {
                let groups = load_roles(db, m.id).await?;
                let password = m.password.clone();
                Ok(Some((model_to_user(m, groups), password)))
            }
            None => Ok(None),
        }
    }

    async fn existing_matriculas(&self, matriculas: &[String]) -> AppResult<HashSet<String>> {
        if matriculas.is_empty() {
            return Ok(HashSet::new());
        }

        let rows = user::Entity::find()
            .filter(user::Column::Matricula.is_in(matriculas.iter().cloned()))
            .all(self.pool.connection())
            .await?;

        Ok(rows.into_iter().map(|m| m.matricula).collect())
    }

    async fn create(&self, new_user: NewUser) -> AppResult<User> {
        let txn = self.pool.connection().begin().await?;

        let exists = user::Entity::find()
            .filter(user::Column::Matricula.eq(new_user.matricula.as_str()))
            .one(&txn)
            .await?
            .is_some();
        if exists {
            return Err(AppError::InvalidInput(format!(
                "User '{}' already exists",
                new_user.matricula
            )));
        }

        let now = Utc::now();
        let mut active = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            matricula: Set(new_user.matricula.clone()),
            password: Set(new_user.password_hash.clone()),
            is_active: Set(true),
            is_staff: Set(new_user.is_staff),
            is_superuser: Set(new_user.is_superuser),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        apply_profile(&mut active, &new_user.profile);
        let model = active.insert(&txn).await?;

        for role in &new_user.groups {
            insert_membership(&txn, model.id, *role).await?;
        }

        let groups = load_roles(&txn, model.id).await?;
        txn.commit().await?;

        Ok(model_to_user(model, groups))
    }

    async fn record_login(&self, id: Uuid) -> AppResult<()> {
        let db = self.pool.connection();
        let model = user::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", id)))?;

        let mut active: user::ActiveModel = model.into();
        active.last_login_at = Set(Some(Utc::now()));
        active.update(db).await?;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        let stmt = Statement::from_string(DatabaseBackend::Postgres, "SELECT 1".to_owned());
        self.pool.connection().query_one_raw(stmt).await?;
        Ok(())
    }
}

/// Overwrite every provider-sourced column.
fn apply_profile(active: &mut user::ActiveModel, profile: &ProfileFields) {
    active.email = Set(profile.email.clone());
    active.nome = Set(profile.nome.clone());
    active.campus = Set(profile.campus.clone());
    active.foto = Set(profile.foto.clone());
    active.sexo = Set(profile.sexo.clone());
    active.tipo_usuario = Set(profile.tipo_usuario.clone());
    active.curso = Set(profile.curso.clone());
    active.situacao = Set(profile.situacao.clone());
    active.data_nascimento = Set(profile.data_nascimento);
}

/// Columns refreshed from the identity provider on every login.
const PROFILE_COLUMNS: [user::Column; 10] = [
    user::Column::Email,
    user::Column::Nome,
    user::Column::Campus,
    user::Column::Foto,
    user::Column::Sexo,
    user::Column::TipoUsuario,
    user::Column::Curso,
    user::Column::Situacao,
    user::Column::DataNascimento,
    user::Column::UpdatedAt,
];

/// Insert keyed on matricula. A concurrent insert of the same matricula
/// becomes an update of the winning row, so the last writer wins.
fn profile_upsert(active: user::ActiveModel) -> Insert<user::ActiveModel> {
    user::Entity::insert(active).on_conflict(
        OnConflict::column(user::Column::Matricula)
            .update_columns(PROFILE_COLUMNS)
            .to_owned(),
    )
}

fn membership_insert(user_id: Uuid, role: Role) -> Insert<user_role::ActiveModel> {
    let model = user_role::ActiveModel {
        user_id: Set(user_id),
        role: Set(role.as_str().to_string()),
        created_at: Set(Utc::now()),
    };
    user_role::Entity::insert(model).on_conflict(
        OnConflict::columns([user_role::Column::UserId, user_role::Column::Role])
            .do_nothing()
            .to_owned(),
    )
}

async fn insert_membership<C: ConnectionTrait>(db: &C, user_id: Uuid, role: Role) -> AppResult<()> {
    let in_catalog = role::Entity::find_by_id(role.as_str().to_string())
        .one(db)
        .await?
        .is_some();
    if !in_catalog {
        return Err(AppError::NotFound(format!("Role '{}'", role)));
    }

    membership_insert(user_id, role)
        .exec_without_returning(db)
        .await?;

    Ok(())
}

async fn load_roles<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<Vec<Role>> {
    let rows = user_role::Entity::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .all(db)
        .await?;

    let mut roles: Vec<Role> = rows
        .iter()
        .filter_map(|r| {
            let parsed = Role::parse(&r.role);
            if parsed.is_none() {
                tracing::warn!("Ignoring unknown role '{}' for user {}", r.role, user_id);
            }
            parsed
        })
        .collect();
    roles.sort();
    roles.dedup();
    Ok(roles)
}

fn model_to_user(m: user::Model, groups: Vec<Role>) -> User {
    User {
        id: m.id,
        matricula: m.matricula,
        email: m.email,
        nome: m.nome,
        campus: m.campus,
        foto: m.foto,
        sexo: m.sexo,
        tipo_usuario: m.tipo_usuario,
        curso: m.curso,
        situacao: m.situacao,
        data_nascimento: m.data_nascimento,
        is_active: m.is_active,
        is_staff: m.is_staff,
        is_superuser: m.is_superuser,
        groups,
        last_login_at: m.last_login_at,
        created_at: m.created_at,
    }
}
