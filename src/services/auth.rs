use anyhow::Result;
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::db::repositories::user::{hash_password, verify_hash_blocking};
use crate::db::{Role, Store, User};

pub const DEFAULT_LANDING_PAGE: &str = "/";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Deliberately identical for unknown username and wrong password.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct AuthService {
    store: Store,
    /// Hash verified when the username does not exist, so both credential
    /// failure branches do comparable argon2 work.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(store: Store, security: &SecurityConfig) -> Result<Self> {
        let dummy_hash = hash_password("dcmrelay-dummy-credential", security)?;
        Ok(Self { store, dummy_hash })
    }

    /// Authenticate a credential pair. On success the login timestamp is
    /// advanced and the caller binds the user to a session and audits `login`.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let found = self
            .store
            .get_user_with_password(username)
            .await
            .map_err(AuthError::Internal)?;

        let Some((user, stored_hash)) = found else {
            let _ = verify_hash_blocking(password.to_string(), self.dummy_hash.clone()).await;
            return Err(AuthError::InvalidCredentials);
        };

        let is_valid = verify_hash_blocking(password.to_string(), stored_hash)
            .await
            .map_err(AuthError::Internal)?;

        if !is_valid {
            return Err(AuthError::InvalidCredentials);
        }

        // Checked only after the password matched: a disabled account must not
        // get a session and must not advance last_login.
        if !user.active {
            return Err(AuthError::AccountDisabled);
        }

        self.store
            .touch_last_login(user.id)
            .await
            .map_err(AuthError::Internal)?;

        Ok(user)
    }

    /// Verify that `password` is the current password of `user`.
    pub async fn verify_current_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        let found = self
            .store
            .get_user_with_password(username)
            .await
            .map_err(AuthError::Internal)?;

        let Some((_, stored_hash)) = found else {
            return Ok(false);
        };

        verify_hash_blocking(password.to_string(), stored_hash)
            .await
            .map_err(AuthError::Internal)
    }
}

/// True only for the closed role set: admin satisfies every requirement.
#[must_use]
pub fn authorize(user: &User, required: Role) -> bool {
    user.active && (user.role == required || user.role == Role::Admin)
}

/// Open-redirect guard: accept only same-origin relative paths for the
/// post-login redirect, anything else falls back to the landing page.
#[must_use]
pub fn safe_redirect(next: Option<&str>) -> String {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\") =>
        {
            path.to_string()
        }
        _ => DEFAULT_LANDING_PAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_redirect_accepts_relative_paths() {
        assert_eq!(safe_redirect(Some("/admin/users")), "/admin/users");
        assert_eq!(safe_redirect(Some("/upload?retry=1")), "/upload?retry=1");
    }

    #[test]
    fn test_safe_redirect_rejects_cross_origin() {
        assert_eq!(safe_redirect(Some("https://evil.example/x")), "/");
        assert_eq!(safe_redirect(Some("//evil.example/x")), "/");
        assert_eq!(safe_redirect(Some("/\\evil.example")), "/");
        assert_eq!(safe_redirect(Some("javascript:alert(1)")), "/");
        assert_eq!(safe_redirect(Some("")), "/");
        assert_eq!(safe_redirect(None), "/");
    }
}
