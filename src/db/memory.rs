//! In-process identity store used by tests and local tooling.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{TokenBlacklist, UserStore};
use crate::auth::password::unusable_password;
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, ProfileFields, Role, User};

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, StoredUser>,
    by_matricula: HashMap<String, Uuid>,
    blacklist: HashMap<String, DateTime<Utc>>,
}

/// [`UserStore`] and [`TokenBlacklist`] kept behind a single lock, so every
/// operation is atomic with respect to the others.
#[derive(Debug)]
pub struct MemoryUserStore {
    catalog: BTreeSet<Role>,
    state: RwLock<MemoryState>,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    /// Store whose role catalog holds every well-known role.
    pub fn new() -> Self {
        Self {
            catalog: Role::ALL.into_iter().collect(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Remove a role from the catalog, as if its seed row were missing.
    pub fn without_role(mut self, role: Role) -> Self {
        self.catalog.remove(&role);
        self
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn upsert_profile(
        &self,
        matricula: &str,
        profile: &ProfileFields,
    ) -> AppResult<(User, bool)> {
        let mut state = self.state.write().await;

        if let Some(id) = state.by_matricula.get(matricula).copied() {
            let stored = state
                .users
                .get_mut(&id)
                .ok_or_else(|| AppError::Internal(format!("Dangling index for {}", matricula)))?;
            apply_profile(&mut stored.user, profile);
            return Ok((stored.user.clone(), false));
        }

        let mut user = User {
            id: Uuid::new_v4(),
            matricula: matricula.to_string(),
            email: None,
            nome: String::new(),
            campus: None,
            foto: None,
            sexo: None,
            tipo_usuario: None,
            curso: None,
            situacao: None,
            data_nascimento: None,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            groups: Vec::new(),
            last_login_at: None,
            created_at: Utc::now(),
        };
        apply_profile(&mut user, profile);

        state.by_matricula.insert(user.matricula.clone(), user.id);
        state.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password: unusable_password(),
            },
        );

        Ok((user, true))
    }

    async fn add_role(&self, user_id: Uuid, role: Role) -> AppResult<()> {
        if !self.catalog.contains(&role) {
            return Err(AppError::NotFound(format!("Role '{}'", role)));
        }

        let mut state = self.state.write().await;
        let stored = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
        if !stored.user.groups.contains(&role) {
            stored.user.groups.push(role);
            stored.user.groups.sort();
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|s| s.user.clone()))
    }

    async fn find_by_matricula(&self, matricula: &str) -> AppResult<Option<User>> {
        Ok(self
            .find_credentials(matricula)
            .await?
            .map(|(user, _)| user))
    }

    async fn find_credentials(&self, matricula: &str) -> AppResult<Option<(User, String)>> {
        let state = self.state.read().await;
        Ok(state
            .by_matricula
            .get(matricula)
            .and_then(|id| state.users.get(id))
            .map(|s| (s.user.clone(), s.password.clone())))
    }

    async fn existing_matriculas(&self, matriculas: &[String]) -> AppResult<HashSet<String>> {
        let state = self.state.read().await;
        Ok(matriculas
            .iter()
            .filter(|m| state.by_matricula.contains_key(m.as_str()))
            .cloned()
            .collect())
    }

    async fn create(&self, new_user: NewUser) -> AppResult<User> {
        if let Some(missing) = new_user.groups.iter().find(|r| !self.catalog.contains(r)) {
            return Err(AppError::NotFound(format!("Role '{}'", missing)));
        }

        let mut state = self.state.write().await;
        if state.by_matricula.contains_key(&new_user.matricula) {
            return Err(AppError::InvalidInput(format!(
                "User '{}' already exists",
                new_user.matricula
            )));
        }

        let mut groups = new_user.groups.clone();
        groups.sort();
        groups.dedup();

        let mut user = User {
            id: Uuid::new_v4(),
            matricula: new_user.matricula.clone(),
            email: None,
            nome: String::new(),
            campus: None,
            foto: None,
            sexo: None,
            tipo_usuario: None,
            curso: None,
            situacao: None,
            data_nascimento: None,
            is_active: true,
            is_staff: new_user.is_staff,
            is_superuser: new_user.is_superuser,
            groups,
            last_login_at: None,
            created_at: Utc::now(),
        };
        apply_profile(&mut user, &new_user.profile);

        state.by_matricula.insert(user.matricula.clone(), user.id);
        state.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password: new_user.password_hash,
            },
        );

        Ok(user)
    }

    async fn record_login(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", id)))?;
        stored.user.last_login_at = Some(Utc::now());
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TokenBlacklist for MemoryUserStore {
    async fn blacklist(&self, jti: &str, _user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.blacklist.entry(jti.to_string()).or_insert(expires_at);
        Ok(())
    }

    async fn is_blacklisted(&self, jti: &str) -> AppResult<bool> {
        Ok(self.state.read().await.blacklist.contains_key(jti))
    }
}

impl MemoryUserStore {
    /// Deactivate an account (tests exercise the disabled-login paths with it).
    pub async fn set_active(&self, id: Uuid, active: bool) -> AppResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", id)))?;
        stored.user.is_active = active;
        Ok(())
    }
}

fn apply_profile(user: &mut User, profile: &ProfileFields) {
    user.email = profile.email.clone();
    user.nome = profile.nome.clone();
    user.campus = profile.campus.clone();
    user.foto = profile.foto.clone();
    user.sexo = profile.sexo.clone();
    user.tipo_usuario = profile.tipo_usuario.clone();
    user.curso = profile.curso.clone();
    user.situacao = profile.situacao.clone();
    user.data_nascimento = profile.data_nascimento;
}
