//! Organizer account provisioning.

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::auth::password::hash_password;
use crate::db::UserStore;
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, ProfileFields, Role, User};

/// Matricula of the organizer ensured at startup.
pub const DEFAULT_ADMIN_MATRICULA: &str = "ifsports_admin";
pub const DEFAULT_ADMIN_EMAIL: &str = "ifsports@admin.com";
pub const DEFAULT_ADMIN_NOME: &str = "Organizador Padrão";

/// Create the organizer account of a campus, or return the existing one unchanged.
pub async fn provision_organizer(
    store: &dyn UserStore,
    campus: &str,
    email: &str,
    password: &SecretString,
) -> AppResult<(User, bool)> {
    let campus = campus.trim();
    if campus.is_empty() {
        return Err(AppError::InvalidInput("campus is required".to_string()));
    }

    let matricula = format!("organizador_{}", campus.to_lowercase());
    if let Some(existing) = store.find_by_matricula(&matricula).await? {
        return Ok((existing, false));
    }

    let user = store
        .create(NewUser {
            matricula,
            profile: ProfileFields {
                nome: format!("Organizador {}", campus.to_uppercase()),
                email: Some(email.trim().to_string()).filter(|e| !e.is_empty()),
                campus: Some(campus.to_uppercase()),
                ..Default::default()
            },
            password_hash: hash_password(password.expose_secret())?,
            is_staff: true,
            is_superuser: false,
            groups: vec![Role::Organizador],
        })
        .await?;

    info!(matricula = %user.matricula, "Provisioned organizer account");
    Ok((user, true))
}

/// Ensure the default superuser organizer exists.
pub async fn ensure_default_organizer(
    store: &dyn UserStore,
    password: &SecretString,
) -> AppResult<User> {
    if let Some(existing) = store.find_by_matricula(DEFAULT_ADMIN_MATRICULA).await? {
        return Ok(existing);
    }

    let user = store
        .create(NewUser {
            matricula: DEFAULT_ADMIN_MATRICULA.to_string(),
            profile: ProfileFields {
                nome: DEFAULT_ADMIN_NOME.to_string(),
                email: Some(DEFAULT_ADMIN_EMAIL.to_string()),
                ..Default::default()
            },
            password_hash: hash_password(password.expose_secret())?,
            is_staff: true,
            is_superuser: true,
            groups: vec![Role::Organizador],
        })
        .await?;

    info!(matricula = %user.matricula, "Created default organizer account");
    Ok(user)
}
