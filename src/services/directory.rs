//! Batch user existence checks used by other services.

use std::collections::HashSet;

use crate::db::UserStore;
use crate::error::AppResult;
use crate::models::user::ValidateUsersResponse;

/// Check which of `user_ids` (matriculas) exist.
///
/// Ids are trimmed, blanks dropped and duplicates removed keeping first-seen
/// order. An empty list is a vacuous success.
pub async fn validate_users(
    store: &dyn UserStore,
    user_ids: &[String],
) -> AppResult<ValidateUsersResponse> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = user_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect();

    if ids.is_empty() {
        return Ok(ValidateUsersResponse {
            all_exist: true,
            valid_ids: Vec::new(),
            invalid_ids: Vec::new(),
            message: "No user ids to validate".to_string(),
        });
    }

    let existing = store.existing_matriculas(&ids).await?;
    let (valid_ids, invalid_ids): (Vec<String>, Vec<String>) =
        ids.into_iter().partition(|id| existing.contains(id));

    let all_exist = invalid_ids.is_empty();
    let message = if all_exist {
        format!("All {} users exist", valid_ids.len())
    } else {
        format!("Users not found: {}", invalid_ids.join(", "))
    };

    Ok(ValidateUsersResponse {
        all_exist,
        valid_ids,
        invalid_ids,
        message,
    })
}
