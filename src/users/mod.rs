//! In-memory user accounts backing the auth/profile endpoints.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::password;
use crate::error::AppError;

/// Public profile fields, returned to clients and mutable via profile update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
struct UserRecord {
    identity: String,
    password_hash: String,
    profile: Profile,
}

/// Account store keyed by username, with a secondary identity index.
pub struct UserStore {
    /// username -> UserRecord
    users: DashMap<String, UserRecord>,
    /// identity -> username
    identity_index: DashMap<String, String>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            identity_index: DashMap::new(),
        }
    }

    /// Create an account and return its server-issued identity.
    pub fn create(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(String, Profile), AppError> {
        if username.len() < 3 {
            return Err(AppError::Validation(
                "Username must be at least 3 characters".to_string(),
            ));
        }
        if password.len() < 6 {
            return Err(AppError::Validation(
                "Password must be at least 6 characters".to_string(),
            ));
        }
        if self.users.contains_key(username) {
            return Err(AppError::Validation(format!(
                "Username {} is already taken",
                username
            )));
        }

        let identity = Uuid::new_v4().to_string();
        let profile = Profile {
            display_name: if display_name.is_empty() {
                username.to_string()
            } else {
                display_name.to_string()
            },
            avatar_url: None,
        };

        let record = UserRecord {
            identity: identity.clone(),
            password_hash: password::hash(password),
            profile: profile.clone(),
        };

        self.users.insert(username.to_string(), record);
        self.identity_index
            .insert(identity.clone(), username.to_string());

        tracing::info!(identity = %identity, username = %username, "Account created");

        Ok((identity, profile))
    }

    /// Check credentials and return the identity and profile on success.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<(String, Profile), AppError> {
        let record = self
            .users
            .get(username)
            .ok_or_else(|| AppError::Auth("Invalid username or password".to_string()))?;

        if !password::verify(password, &record.password_hash) {
            return Err(AppError::Auth("Invalid username or password".to_string()));
        }

        Ok((record.identity.clone(), record.profile.clone()))
    }

    /// Look up the profile for an identity (used by the session check).
    pub fn profile(&self, identity: &str) -> Result<Profile, AppError> {
        let username = self
            .identity_index
            .get(identity)
            .ok_or_else(|| AppError::Auth("Unknown identity".to_string()))?;
        let record = self
            .users
            .get(username.value())
            .ok_or_else(|| AppError::Auth("Unknown identity".to_string()))?;

        Ok(record.profile.clone())
    }

    /// Update profile fields only. Never touches credentials or identity.
    pub fn update_profile(
        &self,
        identity: &str,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Profile, AppError> {
        let username = self
            .identity_index
            .get(identity)
            .ok_or_else(|| AppError::NotFound("Unknown identity".to_string()))?;
        let mut record = self
            .users
            .get_mut(username.value())
            .ok_or_else(|| AppError::NotFound("Unknown identity".to_string()))?;

        if let Some(name) = display_name {
            if name.is_empty() {
                return Err(AppError::Validation(
                    "Display name must not be empty".to_string(),
                ));
            }
            record.profile.display_name = name;
        }
        if let Some(url) = avatar_url {
            record.profile.avatar_url = Some(url);
        }

        Ok(record.profile.clone())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_authenticate() {
        let store = UserStore::new();
        let (identity, profile) = store.create("alice", "secret1", "Alice").unwrap();
        assert_eq!(profile.display_name, "Alice");

        let (auth_identity, _) = store.authenticate("alice", "secret1").unwrap();
        assert_eq!(auth_identity, identity);

        assert!(store.authenticate("alice", "wrong").is_err());
        assert!(store.authenticate("bob", "secret1").is_err());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = UserStore::new();
        store.create("alice", "secret1", "Alice").unwrap();
        let err = store.create("alice", "secret2", "Alice 2").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_update_profile_only_touches_profile() {
        let store = UserStore::new();
        let (identity, _) = store.create("alice", "secret1", "Alice").unwrap();

        let profile = store
            .update_profile(&identity, Some("Alice B".to_string()), None)
            .unwrap();
        assert_eq!(profile.display_name, "Alice B");

        // Credentials unchanged
        assert!(store.authenticate("alice", "secret1").is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let store = UserStore::new();
        assert!(matches!(
            store.create("al", "secret1", "A"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            store.create("alice", "short", "A"),
            Err(AppError::Validation(_))
        ));
    }
}
