//! Credential store abstraction: users, organizations and refresh-session state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::error::StoreError;
use crate::models::{normalize_email, Organization, User, UserChanges};

/// Persistence for users and organizations.
///
/// Refresh-session fields change only through [`swap_refresh_token`] and
/// [`invalidate_refresh_tokens`], both single-document atomic updates.
///
/// [`swap_refresh_token`]: CredentialStore::swap_refresh_token
/// [`invalidate_refresh_tokens`]: CredentialStore::invalidate_refresh_tokens
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn insert_organization(&self, org: &Organization) -> Result<(), StoreError>;
    async fn find_organization(&self, org_id: &str) -> Result<Option<Organization>, StoreError>;
    /// Replaces name-independent fields (timezone, settings, updated_at). `false` if absent.
    async fn update_organization(&self, org: &Organization) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::DuplicateEmail`] if the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// One page of an organization's users plus the organization's user count.
    async fn list_users(
        &self,
        org_id: &str,
        limit: i64,
        skip: u64,
    ) -> Result<(Vec<User>, u64), StoreError>;
    /// Applies profile changes; `None` if the user does not exist.
    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, StoreError>;
    async fn set_password_hash(&self, user_id: &str, password_hash: &str)
        -> Result<bool, StoreError>;
    async fn record_login(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Compare-and-swap of the refresh session.
    ///
    /// Writes `new_fingerprint`/`new_version` only if the stored version and
    /// fingerprint still equal the expected values. `false` means another
    /// writer got there first.
    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected_version: i64,
        expected_fingerprint: Option<&str>,
        new_fingerprint: &str,
        new_version: i64,
    ) -> Result<bool, StoreError>;

    /// Clears the fingerprint and increments the version unconditionally.
    async fn invalidate_refresh_tokens(&self, user_id: &str) -> Result<(), StoreError>;
}

/// Process-local store for tests and local development.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<String, User>>,
    organizations: Mutex<HashMap<String, Organization>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> Result<MutexGuard<'_, HashMap<String, User>>, StoreError> {
        self.users
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("User store mutex poisoned: {}", e)))
    }

    fn organizations(&self) -> Result<MutexGuard<'_, HashMap<String, Organization>>, StoreError> {
        self.organizations.lock().map_err(|e| {
            StoreError::Backend(anyhow::anyhow!("Organization store mutex poisoned: {}", e))
        })
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_organization(&self, org: &Organization) -> Result<(), StoreError> {
        self.organizations()?.insert(org.id.clone(), org.clone());
        Ok(())
    }

    async fn find_organization(&self, org_id: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self.organizations()?.get(org_id).cloned())
    }

    async fn update_organization(&self, org: &Organization) -> Result<bool, StoreError> {
        let mut orgs = self.organizations()?;
        match orgs.get_mut(&org.id) {
            Some(existing) => {
                existing.timezone = org.timezone.clone();
                existing.settings = org.settings.clone();
                existing.updated_at = org.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users()?;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users()?.get(user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        Ok(self.users()?.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(
        &self,
        org_id: &str,
        limit: i64,
        skip: u64,
    ) -> Result<(Vec<User>, u64), StoreError> {
        let users = self.users()?;
        let mut scoped: Vec<&User> = users.values().filter(|u| u.org_id == org_id).collect();
        scoped.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let total = scoped.len() as u64;
        let page = scoped
            .into_iter()
            .skip(skip as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn update_user(
        &self,
        user_id: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users()?;

        if let Some(email) = &changes.email {
            let email = normalize_email(email);
            if users.values().any(|u| u.email == email && u.id != user_id) {
                return Err(StoreError::DuplicateEmail);
            }
        }

        let Some(user) = users.get_mut(user_id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            user.name = name.trim().to_string();
        }
        if let Some(email) = &changes.email {
            user.email = normalize_email(email);
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(active) = changes.is_active {
            user.is_active = active;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users()?;
        match users.get_mut(user_id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_login(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<(), StoreError> {
        if let Some(user) = self.users()?.get_mut(user_id) {
            user.last_login_at = Some(bson::DateTime::from_chrono(at));
            user.last_login_ip = ip.map(str::to_string);
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected_version: i64,
        expected_fingerprint: Option<&str>,
        new_fingerprint: &str,
        new_version: i64,
    ) -> Result<bool, StoreError> {
        let mut users = self.users()?;
        let Some(user) = users.get_mut(user_id) else {
            return Ok(false);
        };

        if user.refresh_token_version != expected_version
            || user.refresh_token_fingerprint.as_deref() != expected_fingerprint
        {
            return Ok(false);
        }

        user.refresh_token_fingerprint = Some(new_fingerprint.to_string());
        user.refresh_token_version = new_version;
        Ok(true)
    }

    async fn invalidate_refresh_tokens(&self, user_id: &str) -> Result<(), StoreError> {
        if let Some(user) = self.users()?.get_mut(user_id) {
            user.refresh_token_fingerprint = None;
            user.refresh_token_version += 1;
        }
        Ok(())
    }
}
