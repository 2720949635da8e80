//! Reconciles provider identities with the local directory.

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::UserStore;
use crate::error::{AppError, AppResult};
use crate::models::{ProfileFields, Role, User};

/// Creates or refreshes local users from provider profiles.
#[derive(Clone)]
pub struct IdentityReconciler {
    store: Arc<dyn UserStore>,
}

impl IdentityReconciler {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Upsert the user keyed by `matricula` and make sure it holds at least one role.
    ///
    /// Existing users keep their roles, staff flags and password. A user with no
    /// role gets [`Role::DEFAULT`]; if the role catalog lacks it, the login proceeds
    /// with an empty role set.
    pub async fn reconcile(
        &self,
        matricula: &str,
        profile: &ProfileFields,
    ) -> AppResult<(User, bool)> {
        let matricula = matricula.trim();
        if matricula.is_empty() {
            return Err(AppError::InvalidInput("matricula is required".to_string()));
        }

        let mut profile = profile.clone();
        if profile.nome.trim().is_empty() {
            profile.nome = matricula.to_string();
        }

        let (mut user, created) = self.store.upsert_profile(matricula, &profile).await?;

        if user.groups.is_empty() {
            match self.store.add_role(user.id, Role::DEFAULT).await {
                Ok(()) => {
                    user.groups.push(Role::DEFAULT);
                }
                Err(AppError::NotFound(_)) => {
                    warn!(
                        matricula = %user.matricula,
                        "Role '{}' missing from catalog, user left without a role",
                        Role::DEFAULT
                    );
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            matricula = %user.matricula,
            created,
            groups = ?user.group_names(),
            "Reconciled provider identity"
        );

        Ok((user, created))
    }
}
