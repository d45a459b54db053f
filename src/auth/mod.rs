use axum::http::HeaderMap;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::profile::{Profile, Role};
use crate::state::AppState;

/// Opaque bearer tokens standing in for the hosted platform's identity
/// resolution. One token per registration; tokens never expire in-process.
pub struct SessionTokens {
    tokens: DashMap<String, Uuid>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    pub fn issue(&self, profile_id: Uuid) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens.insert(token.clone(), profile_id);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<Uuid> {
        self.tokens.get(token).map(|entry| *entry.value())
    }
}

impl Default for SessionTokens {
    fn default() -> Self {
        Self::new()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Resolves the caller's identity or fails with `Unauthenticated`.
pub fn require_authenticated(state: &AppState, headers: &HeaderMap) -> Result<Uuid, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthenticated)?;
    require_token(state, token)
}

/// Token-based variant for callers that cannot set headers (websockets).
pub fn require_token(state: &AppState, token: &str) -> Result<Uuid, AppError> {
    state
        .sessions
        .resolve(token)
        .ok_or(AppError::Unauthenticated)
}

/// Resolves the caller's profile and fails with `Forbidden` unless its role
/// is in the allowed set. Runs in addition to any ownership checks done by
/// the coordinator; a guard rejection never touches storage.
pub fn require_role(
    state: &AppState,
    headers: &HeaderMap,
    allowed: &[Role],
) -> Result<Profile, AppError> {
    let user_id = require_authenticated(state, headers)?;
    require_role_for(state, user_id, allowed)
}

pub fn require_role_for(
    state: &AppState,
    user_id: Uuid,
    allowed: &[Role],
) -> Result<Profile, AppError> {
    let profile = state
        .profiles
        .get(&user_id)
        .map(|entry| entry.value().clone())
        .ok_or(AppError::Unauthenticated)?;

    if !allowed.contains(&profile.role) {
        let roles: Vec<&str> = allowed.iter().map(Role::as_str).collect();
        return Err(AppError::Forbidden(format!(
            "requires role {}",
            roles.join(" or ")
        )));
    }

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::SessionTokens;
    use uuid::Uuid;

    #[test]
    fn issued_token_resolves_to_profile() {
        let sessions = SessionTokens::new();
        let profile_id = Uuid::new_v4();

        let token = sessions.issue(profile_id);

        assert_eq!(sessions.resolve(&token), Some(profile_id));
    }

    #[test]
    fn unknown_token_does_not_resolve() {
        let sessions = SessionTokens::new();
        assert_eq!(sessions.resolve("not-a-token"), None);
    }
}
