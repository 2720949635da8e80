//! User models for the local identity directory.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The two well-known roles (Django-style groups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Role {
    /// Administrative role, only assigned by provisioning.
    Organizador,
    /// Default end-user role for SSO accounts.
    Jogador,
}

impl Role {
    /// Role given to SSO users that belong to no group.
    pub const DEFAULT: Role = Role::Jogador;

    pub const ALL: [Role; 2] = [Role::Organizador, Role::Jogador];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organizador => "Organizador",
            Self::Jogador => "Jogador",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Organizador" => Some(Self::Organizador),
            "Jogador" => Some(Self::Jogador),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-sourced attributes, overwritten on every reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub email: Option<String>,
    pub nome: String,
    pub campus: Option<String>,
    pub foto: Option<String>,
    pub sexo: Option<String>,
    pub tipo_usuario: Option<String>,
    pub curso: Option<String>,
    pub situacao: Option<String>,
    pub data_nascimento: Option<NaiveDate>,
}

/// User stored in database. The password hash never leaves the store through this type.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub matricula: String,
    pub email: Option<String>,
    pub nome: String,
    pub campus: Option<String>,
    pub foto: Option<String>,
    pub sexo: Option<String>,
    pub tipo_usuario: Option<String>,
    pub curso: Option<String>,
    pub situacao: Option<String>,
    pub data_nascimento: Option<NaiveDate>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Sorted, deduplicated role set.
    pub groups: Vec<Role>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Provider attributes as currently stored.
    pub fn profile(&self) -> ProfileFields {
        ProfileFields {
            email: self.email.clone(),
            nome: self.nome.clone(),
            campus: self.campus.clone(),
            foto: self.foto.clone(),
            sexo: self.sexo.clone(),
            tipo_usuario: self.tipo_usuario.clone(),
            curso: self.curso.clone(),
            situacao: self.situacao.clone(),
            data_nascimento: self.data_nascimento,
        }
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|r| r.as_str().to_string()).collect()
    }
}

/// Public view of a user returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub matricula: String,
    pub email: Option<String>,
    pub nome: String,
    pub campus: Option<String>,
    pub foto: Option<String>,
    pub sexo: Option<String>,
    pub tipo_usuario: Option<String>,
    pub curso: Option<String>,
    pub situacao: Option<String>,
    pub data_nascimento: Option<NaiveDate>,
    pub is_active: bool,
    pub is_staff: bool,
    pub groups: Vec<Role>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            matricula: user.matricula,
            email: user.email,
            nome: user.nome,
            campus: user.campus,
            foto: user.foto,
            sexo: user.sexo,
            tipo_usuario: user.tipo_usuario,
            curso: user.curso,
            situacao: user.situacao,
            data_nascimento: user.data_nascimento,
            is_active: user.is_active,
            is_staff: user.is_staff,
            groups: user.groups,
        }
    }
}

/// Administrative account creation request (organizers, default admin).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub matricula: String,
    pub profile: ProfileFields,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub groups: Vec<Role>,
}

/// Local login request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub matricula: String,
    pub password: String,
}

/// Batch existence check request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateUsersRequest {
    pub user_ids: Vec<String>,
}

/// Batch existence check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidateUsersResponse {
    pub all_exist: bool,
    pub valid_ids: Vec<String>,
    pub invalid_ids: Vec<String>,
    pub message: String,
}
