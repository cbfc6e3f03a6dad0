//! Session lifecycle: registration, login, refresh rotation, logout and
//! password change.
//!
//! Each user has one refresh session described by a fingerprint and a
//! version. Login issues a refresh token at the current version; every
//! refresh rotates to `version + 1` through a compare-and-swap, so a refresh
//! token can be redeemed at most once. Presenting a token whose version or
//! fingerprint no longer matches is treated as theft: the session is revoked
//! and the caller must log in again.

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::audit::{AuditTrail, ClientInfo};
use super::error::ServiceError;
use super::jwt::TokenCodec;
use super::store::CredentialStore;
use crate::models::{AuditAction, AuditEntry, PublicUser, Role, User};
use crate::utils::{Password, PasswordHashString, PasswordHasher};

/// SHA-256 hex digest of a refresh token. Only this is persisted.
pub fn refresh_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Password,
    pub org_id: String,
    pub role: Option<Role>,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: PublicUser,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    tokens: TokenCodec,
    audit: AuditTrail,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        tokens: TokenCodec,
        audit: AuditTrail,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            audit,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Creates a user in an existing organization. Does not log the user in.
    pub async fn register(
        &self,
        new_user: NewUser,
        client: &ClientInfo,
    ) -> Result<User, ServiceError> {
        self.create_user(new_user, None, AuditAction::UserRegistered, client)
            .await
    }

    /// Shared by self-registration, invitations and organization onboarding.
    pub(crate) async fn create_user(
        &self,
        new_user: NewUser,
        actor_id: Option<&str>,
        action: AuditAction,
        client: &ClientInfo,
    ) -> Result<User, ServiceError> {
        if self.store.find_organization(&new_user.org_id).await?.is_none() {
            return Err(ServiceError::OrganizationNotFound);
        }

        if self
            .store
            .find_user_by_email(&new_user.email)
            .await?
            .is_some()
        {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password_hash = self.hasher.hash(&new_user.password).await?;
        let role = new_user.role.unwrap_or_default();
        let user = User::new(
            new_user.org_id,
            new_user.name,
            &new_user.email,
            password_hash.into_string(),
            role,
        );

        // unique index still decides a concurrent registration race
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, org_id = %user.org_id, role = %user.role, action = %action, "User created");

        self.audit
            .record(
                AuditEntry::new(
                    user.org_id.clone(),
                    Some(actor_id.unwrap_or(&user.id).to_string()),
                    action,
                )
                .entity("USER", user.id.clone())
                .new_value(json!({ "email": user.email, "role": user.role }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(user)
    }

    /// Absent user, inactive user and wrong password all fail with the same error.
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, ServiceError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            metrics::counter!("auth_login_total", "outcome" => "failure").increment(1);
            tracing::warn!("Login failed: unknown email");
            return Err(ServiceError::InvalidCredentials);
        };

        let matches = self
            .hasher
            .verify(password, &PasswordHashString::new(user.password_hash.clone()))
            .await?;

        if !matches || !user.is_active {
            metrics::counter!("auth_login_total", "outcome" => "failure").increment(1);
            tracing::warn!(user_id = %user.id, active = user.is_active, "Login failed");
            return Err(ServiceError::InvalidCredentials);
        }

        let access_token = self.tokens.sign_access(&user.id, &user.org_id, user.role)?;
        let refresh_token =
            self.tokens
                .sign_refresh(&user.id, &user.org_id, user.refresh_token_version)?;

        let stored = self
            .store
            .swap_refresh_token(
                &user.id,
                user.refresh_token_version,
                user.refresh_token_fingerprint.as_deref(),
                &refresh_fingerprint(&refresh_token),
                user.refresh_token_version,
            )
            .await?;

        if !stored {
            tracing::warn!(user_id = %user.id, "Refresh session changed during login");
            return Err(ServiceError::SessionConflict);
        }

        self.store
            .record_login(&user.id, Utc::now(), client.ip.as_deref())
            .await?;

        metrics::counter!("auth_login_total", "outcome" => "success").increment(1);
        tracing::info!(user_id = %user.id, org_id = %user.org_id, "User logged in");

        self.audit
            .record(
                AuditEntry::new(user.org_id.clone(), Some(user.id.clone()), AuditAction::Login)
                    .entity("USER", user.id.clone())
                    .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(LoginOutcome {
            tokens: TokenPair {
                access_token,
                refresh_token,
            },
            user: user.to_public(),
        })
    }

    /// Redeems a refresh token for a new token pair, rotating the session version.
    pub async fn refresh_access_token(
        &self,
        presented: &str,
        caller_user_id: &str,
        caller_org_id: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, ServiceError> {
        let claims = self.tokens.verify_refresh(presented).map_err(|e| {
            tracing::debug!(error = %e, "Refresh token rejected");
            ServiceError::InvalidToken
        })?;

        if claims.sub != caller_user_id || claims.org_id != caller_org_id {
            tracing::warn!(
                caller = %caller_user_id,
                token_subject = %claims.sub,
                "Refresh token does not belong to caller"
            );
            return Err(ServiceError::InvalidToken);
        }

        let user = self
            .store
            .find_user_by_id(&claims.sub)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if !user.is_active {
            return Err(ServiceError::InvalidToken);
        }

        let fingerprint = refresh_fingerprint(presented);
        if claims.ver != user.refresh_token_version
            || user.refresh_token_fingerprint.as_deref() != Some(fingerprint.as_str())
        {
            return Err(self.reuse_detected(&user, claims.ver, client).await);
        }

        let next_version = claims.ver + 1;
        let access_token = self.tokens.sign_access(&user.id, &user.org_id, user.role)?;
        let refresh_token = self
            .tokens
            .sign_refresh(&user.id, &user.org_id, next_version)?;

        let rotated = self
            .store
            .swap_refresh_token(
                &user.id,
                claims.ver,
                Some(&fingerprint),
                &refresh_fingerprint(&refresh_token),
                next_version,
            )
            .await?;

        if !rotated {
            // another request redeemed the same token first
            return Err(self.reuse_detected(&user, claims.ver, client).await);
        }

        metrics::counter!("auth_token_refresh_total", "outcome" => "rotated").increment(1);
        tracing::debug!(user_id = %user.id, version = next_version, "Refresh token rotated");

        self.audit
            .record(
                AuditEntry::new(
                    user.org_id.clone(),
                    Some(user.id.clone()),
                    AuditAction::TokenRefreshed,
                )
                .entity("USER", user.id.clone())
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    async fn reuse_detected(
        &self,
        user: &User,
        presented_version: i64,
        client: &ClientInfo,
    ) -> ServiceError {
        if let Err(e) = self.store.invalidate_refresh_tokens(&user.id).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to revoke session after reuse detection");
            return ServiceError::from(e);
        }

        metrics::counter!("auth_token_refresh_total", "outcome" => "reuse_detected").increment(1);
        tracing::warn!(
            user_id = %user.id,
            org_id = %user.org_id,
            presented_version,
            stored_version = user.refresh_token_version,
            ip = ?client.ip,
            "Refresh token reuse detected; session revoked"
        );

        self.audit
            .record(
                AuditEntry::new(
                    user.org_id.clone(),
                    Some(user.id.clone()),
                    AuditAction::RefreshTokenReuseDetected,
                )
                .entity("USER", user.id.clone())
                .old_value(json!({ "presentedVersion": presented_version }))
                .new_value(json!({ "storedVersion": user.refresh_token_version }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        ServiceError::TokenReuseDetected
    }

    /// Revokes the stored refresh session unconditionally.
    pub async fn logout(
        &self,
        user_id: &str,
        org_id: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        self.store.invalidate_refresh_tokens(user_id).await?;

        tracing::info!(user_id = %user_id, "User logged out");

        self.audit
            .record(
                AuditEntry::new(org_id, Some(user_id.to_string()), AuditAction::Logout)
                    .entity("USER", user_id)
                    .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(())
    }

    /// Re-hashes the password and revokes every outstanding refresh token.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &Password,
        new_password: &Password,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let matches = self
            .hasher
            .verify(
                current_password,
                &PasswordHashString::new(user.password_hash.clone()),
            )
            .await?;

        if !matches {
            tracing::warn!(user_id = %user.id, "Password change rejected: current password mismatch");
            return Err(ServiceError::IncorrectCurrentPassword);
        }

        if current_password.as_str() == new_password.as_str() {
            return Err(ServiceError::invalid_field(
                "newPassword",
                "password_reuse",
                "New password must differ from the current password".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(new_password).await?;
        if !self
            .store
            .set_password_hash(&user.id, password_hash.as_str())
            .await?
        {
            return Err(ServiceError::UserNotFound);
        }
        self.store.invalidate_refresh_tokens(&user.id).await?;

        tracing::info!(user_id = %user.id, "Password changed; refresh tokens revoked");

        self.audit
            .record(
                AuditEntry::new(
                    user.org_id.clone(),
                    Some(user.id.clone()),
                    AuditAction::PasswordChanged,
                )
                .entity("USER", user.id.clone())
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(())
    }

    pub async fn current_user(&self, user_id: &str) -> Result<PublicUser, ServiceError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .map(|u| u.to_public())
            .ok_or(ServiceError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JwtConfig, PasswordHashConfig};
    use crate::models::{Organization, UserChanges};
    use crate::services::audit::InMemoryAuditLog;
    use crate::services::error::StoreError;
    use crate::services::store::InMemoryCredentialStore;
    use secrecy::Secret;

    struct Harness {
        sessions: SessionManager,
        store: Arc<InMemoryCredentialStore>,
        log: Arc<InMemoryAuditLog>,
        user: User,
    }

    fn manager(store: Arc<dyn CredentialStore>, log: Arc<InMemoryAuditLog>) -> SessionManager {
        let hasher = PasswordHasher::new(&PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let tokens = TokenCodec::new(&JwtConfig {
            access_secret: Secret::new("session-access-secret-0123456789abcdef".to_string()),
            refresh_secret: Secret::new("session-refresh-secret-0123456789abcdef".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });
        SessionManager::new(store, hasher, tokens, AuditTrail::new(log))
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemoryCredentialStore::new());
        let log = Arc::new(InMemoryAuditLog::new());
        let sessions = manager(store.clone(), log.clone());

        let mut org = Organization::new("Demo".to_string(), None, None, None);
        org.id = "o1".to_string();
        store.insert_organization(&org).await.unwrap();

        let user = sessions
            .register(
                NewUser {
                    name: "Alice".to_string(),
                    email: "alice@demo.org".to_string(),
                    password: Password::new("Passw0rd!"),
                    org_id: "o1".to_string(),
                    role: None,
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap();

        Harness {
            sessions,
            store,
            log,
            user,
        }
    }

    async fn login(h: &Harness) -> LoginOutcome {
        h.sessions
            .login(
                "alice@demo.org",
                &Password::new("Passw0rd!"),
                &ClientInfo::default(),
            )
            .await
            .unwrap()
    }

    fn reuse_audits(log: &InMemoryAuditLog) -> usize {
        log.entries()
            .iter()
            .filter(|e| e.action == AuditAction::RefreshTokenReuseDetected)
            .count()
    }

    #[tokio::test]
    async fn register_defaults_to_viewer_and_stores_no_session() {
        let h = harness().await;

        assert_eq!(h.user.role, Role::Viewer);
        assert!(h.user.refresh_token_fingerprint.is_none());
        assert_ne!(h.user.password_hash, "Passw0rd!");
    }

    #[tokio::test]
    async fn login_persists_fingerprint_at_current_version() {
        let h = harness().await;
        let outcome = login(&h).await;

        let stored = h.store.find_user_by_id(&h.user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_version, 0);
        assert_eq!(
            stored.refresh_token_fingerprint.as_deref(),
            Some(refresh_fingerprint(&outcome.tokens.refresh_token).as_str())
        );
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn stale_version_revokes_session() {
        let h = harness().await;
        let first = login(&h).await;
        let client = ClientInfo::default();

        let rotated = h
            .sessions
            .refresh_access_token(&first.tokens.refresh_token, &h.user.id, "o1", &client)
            .await
            .unwrap();

        let replay = h
            .sessions
            .refresh_access_token(&first.tokens.refresh_token, &h.user.id, "o1", &client)
            .await;
        assert!(matches!(replay, Err(ServiceError::TokenReuseDetected)));

        let after = h
            .sessions
            .refresh_access_token(&rotated.refresh_token, &h.user.id, "o1", &client)
            .await;
        assert!(after.is_err());
        assert_eq!(reuse_audits(&h.log), 2);
    }

    #[tokio::test]
    async fn token_for_another_caller_is_invalid_without_revocation() {
        let h = harness().await;
        let outcome = login(&h).await;

        let res = h
            .sessions
            .refresh_access_token(
                &outcome.tokens.refresh_token,
                "someone-else",
                "o1",
                &ClientInfo::default(),
            )
            .await;

        assert!(matches!(res, Err(ServiceError::InvalidToken)));
        assert_eq!(reuse_audits(&h.log), 0);
        let stored = h.store.find_user_by_id(&h.user.id).await.unwrap().unwrap();
        assert!(stored.refresh_token_fingerprint.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_refresh_rotates_at_most_once() {
        let h = harness().await;
        let outcome = login(&h).await;
        let token = outcome.tokens.refresh_token;

        let spawn = |sessions: SessionManager, token: String, user_id: String| {
            tokio::spawn(async move {
                sessions
                    .refresh_access_token(&token, &user_id, "o1", &ClientInfo::default())
                    .await
            })
        };
        let a = spawn(h.sessions.clone(), token.clone(), h.user.id.clone());
        let b = spawn(h.sessions.clone(), token.clone(), h.user.id.clone());
        let (a, b) = tokio::join!(a, b);
        let results = [a.unwrap(), b.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(ServiceError::TokenReuseDetected)))
                .count(),
            1
        );
        assert_eq!(reuse_audits(&h.log), 1);

        let stored = h.store.find_user_by_id(&h.user.id).await.unwrap().unwrap();
        assert!(stored.refresh_token_fingerprint.is_none());
        assert_eq!(stored.refresh_token_version, 2);
    }

    #[tokio::test]
    async fn logout_bumps_version_and_clears_fingerprint() {
        let h = harness().await;
        let outcome = login(&h).await;

        h.sessions
            .logout(&h.user.id, "o1", &ClientInfo::default())
            .await
            .unwrap();

        let stored = h.store.find_user_by_id(&h.user.id).await.unwrap().unwrap();
        assert!(stored.refresh_token_fingerprint.is_none());
        assert_eq!(stored.refresh_token_version, 1);

        let res = h
            .sessions
            .refresh_access_token(
                &outcome.tokens.refresh_token,
                &h.user.id,
                "o1",
                &ClientInfo::default(),
            )
            .await;
        assert!(res.is_err());
    }

    /// Delegates to an in-memory store but revokes the session right before
    /// every swap, as a concurrent logout would.
    struct RevokingStore(Arc<InMemoryCredentialStore>);

    #[async_trait::async_trait]
    impl CredentialStore for RevokingStore {
        async fn health_check(&self) -> Result<(), StoreError> {
            self.0.health_check().await
        }
        async fn insert_organization(&self, org: &Organization) -> Result<(), StoreError> {
            self.0.insert_organization(org).await
        }
        async fn find_organization(
            &self,
            org_id: &str,
        ) -> Result<Option<Organization>, StoreError> {
            self.0.find_organization(org_id).await
        }
        async fn update_organization(&self, org: &Organization) -> Result<bool, StoreError> {
            self.0.update_organization(org).await
        }
        async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
            self.0.insert_user(user).await
        }
        async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
            self.0.find_user_by_id(user_id).await
        }
        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.0.find_user_by_email(email).await
        }
        async fn list_users(
            &self,
            org_id: &str,
            limit: i64,
            skip: u64,
        ) -> Result<(Vec<User>, u64), StoreError> {
            self.0.list_users(org_id, limit, skip).await
        }
        async fn update_user(
            &self,
            user_id: &str,
            changes: &UserChanges,
        ) -> Result<Option<User>, StoreError> {
            self.0.update_user(user_id, changes).await
        }
        async fn set_password_hash(
            &self,
            user_id: &str,
            password_hash: &str,
        ) -> Result<bool, StoreError> {
            self.0.set_password_hash(user_id, password_hash).await
        }
        async fn record_login(
            &self,
            user_id: &str,
            at: chrono::DateTime<Utc>,
            ip: Option<&str>,
        ) -> Result<(), StoreError> {
            self.0.record_login(user_id, at, ip).await
        }
        async fn swap_refresh_token(
            &self,
            user_id: &str,
            expected_version: i64,
            expected_fingerprint: Option<&str>,
            new_fingerprint: &str,
            new_version: i64,
        ) -> Result<bool, StoreError> {
            self.0.invalidate_refresh_tokens(user_id).await?;
            self.0
                .swap_refresh_token(
                    user_id,
                    expected_version,
                    expected_fingerprint,
                    new_fingerprint,
                    new_version,
                )
                .await
        }
        async fn invalidate_refresh_tokens(&self, user_id: &str) -> Result<(), StoreError> {
            self.0.invalidate_refresh_tokens(user_id).await
        }
    }

    #[tokio::test]
    async fn login_losing_the_swap_leaves_no_login_record() {
        let inner = Arc::new(InMemoryCredentialStore::new());
        let log = Arc::new(InMemoryAuditLog::new());
        let sessions = manager(Arc::new(RevokingStore(inner.clone())), log.clone());

        let mut org = Organization::new("Demo".to_string(), None, None, None);
        org.id = "o1".to_string();
        inner.insert_organization(&org).await.unwrap();
        let user = sessions
            .register(
                NewUser {
                    name: "Alice".to_string(),
                    email: "alice@demo.org".to_string(),
                    password: Password::new("Passw0rd!"),
                    org_id: "o1".to_string(),
                    role: None,
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap();

        let res = sessions
            .login(
                "alice@demo.org",
                &Password::new("Passw0rd!"),
                &ClientInfo::new(Some("203.0.113.9".to_string()), None),
            )
            .await;

        assert!(matches!(res, Err(ServiceError::SessionConflict)));
        let stored = inner.find_user_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.last_login_at.is_none());
        assert!(stored.last_login_ip.is_none());
        assert!(!log.entries().iter().any(|e| e.action == AuditAction::Login));
    }

    #[test]
    fn fingerprint_is_stable_hex_sha256() {
        let a = refresh_fingerprint("token-a");
        assert_eq!(a.len(), 64);
        assert_eq!(a, refresh_fingerprint("token-a"));
        assert_ne!(a, refresh_fingerprint("token-b"));
        assert!(!a.contains("token"));
    }
}
