//! Tenant-scoped user administration.

use serde_json::json;
use std::sync::Arc;

use super::audit::{AuditTrail, ClientInfo};
use super::error::ServiceError;
use super::guard::{AuthContext, AuthorizationGuard};
use super::policy::{self, Policy};
use super::session::{NewUser, SessionManager};
use super::store::CredentialStore;
use crate::dtos::user::{ActivityLogResponse, UpdateUserRequest, UserListResponse};
use crate::models::{AuditAction, AuditEntry, PublicUser, Role, User, UserChanges, UserSummary};
use crate::utils::{generate_temporary_password, Password};

const TEMPORARY_PASSWORD_LENGTH: usize = 12;

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn CredentialStore>,
    sessions: SessionManager,
    guard: AuthorizationGuard,
    audit: AuditTrail,
}

impl UserService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: SessionManager,
        guard: AuthorizationGuard,
        audit: AuditTrail,
    ) -> Self {
        Self {
            store,
            sessions,
            guard,
            audit,
        }
    }

    /// Loads `target_id` and enforces that it lives in the caller's organization.
    async fn load_in_tenant(
        &self,
        ctx: &AuthContext,
        target_id: &str,
        resource: &str,
        client: &ClientInfo,
    ) -> Result<User, ServiceError> {
        let user = self
            .store
            .find_user_by_id(target_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        self.guard
            .validate_tenant_scope(ctx, Some(&user.org_id), resource, client)
            .await?;

        Ok(user)
    }

    /// Self-service or an administrator of the same organization.
    async fn require_self_or_admin(
        &self,
        ctx: &AuthContext,
        target_id: &str,
        resource: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        if policy::can_manage_user(&ctx.user_id, ctx.role, target_id) {
            return Ok(());
        }
        self.guard
            .authorize(ctx, Policy::ManageUsers, resource, client)
            .await
    }

    pub async fn list_users(
        &self,
        ctx: &AuthContext,
        limit: i64,
        skip: u64,
    ) -> Result<UserListResponse, ServiceError> {
        let (users, total) = self.store.list_users(&ctx.org_id, limit, skip).await?;

        Ok(UserListResponse {
            users: users.iter().map(UserSummary::from).collect(),
            total,
            limit,
            skip,
        })
    }

    pub async fn get_user(
        &self,
        ctx: &AuthContext,
        target_id: &str,
        client: &ClientInfo,
    ) -> Result<PublicUser, ServiceError> {
        let resource = format!("GET /users/{}", target_id);
        let user = self.load_in_tenant(ctx, target_id, &resource, client).await?;
        self.require_self_or_admin(ctx, target_id, &resource, client)
            .await?;
        Ok(user.to_public())
    }

    pub async fn update_user(
        &self,
        ctx: &AuthContext,
        target_id: &str,
        req: UpdateUserRequest,
        client: &ClientInfo,
    ) -> Result<PublicUser, ServiceError> {
        let resource = format!("PUT /users/{}", target_id);

        self.guard
            .prevent_privilege_escalation(ctx, req.role, &resource, client)
            .await?;
        self.guard
            .validate_tenant_scope(ctx, req.org_id.as_deref(), &resource, client)
            .await?;

        let before = self.load_in_tenant(ctx, target_id, &resource, client).await?;
        self.require_self_or_admin(ctx, target_id, &resource, client)
            .await?;

        if ctx.user_id == target_id && req.role.is_some_and(|role| role != before.role) {
            return Err(ServiceError::BadRequest(
                "Administrators cannot change their own role",
            ));
        }

        let changes = UserChanges {
            name: req.name,
            email: req.email,
            role: req.role,
            is_active: None,
        };
        if changes.is_empty() {
            return Ok(before.to_public());
        }

        let after = self
            .store
            .update_user(target_id, &changes)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        self.audit
            .record(
                AuditEntry::new(
                    ctx.org_id.clone(),
                    Some(ctx.user_id.clone()),
                    AuditAction::UserUpdated,
                )
                .entity("USER", target_id)
                .old_value(json!({ "name": before.name, "email": before.email, "role": before.role }))
                .new_value(json!({ "name": after.name, "email": after.email, "role": after.role }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(after.to_public())
    }

    pub async fn assign_role(
        &self,
        ctx: &AuthContext,
        target_id: &str,
        role: Role,
        client: &ClientInfo,
    ) -> Result<PublicUser, ServiceError> {
        let resource = format!("POST /users/{}/assign-role", target_id);

        self.guard
            .prevent_privilege_escalation(ctx, Some(role), &resource, client)
            .await?;
        let before = self.load_in_tenant(ctx, target_id, &resource, client).await?;

        if ctx.user_id == target_id {
            return Err(ServiceError::BadRequest(
                "Administrators cannot change their own role",
            ));
        }

        let after = self
            .store
            .update_user(
                target_id,
                &UserChanges {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        tracing::info!(
            actor = %ctx.user_id,
            target = %target_id,
            old_role = %before.role,
            new_role = %after.role,
            "Role assigned"
        );

        self.audit
            .record(
                AuditEntry::new(
                    ctx.org_id.clone(),
                    Some(ctx.user_id.clone()),
                    AuditAction::RoleAssigned,
                )
                .entity("USER", target_id)
                .old_value(json!({ "role": before.role }))
                .new_value(json!({ "role": after.role }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(after.to_public())
    }

    /// Deactivation also revokes the user's refresh session.
    pub async fn set_active(
        &self,
        ctx: &AuthContext,
        target_id: &str,
        active: bool,
        client: &ClientInfo,
    ) -> Result<PublicUser, ServiceError> {
        let verb = if active { "activate" } else { "deactivate" };
        let resource = format!("POST /users/{}/{}", target_id, verb);

        let before = self.load_in_tenant(ctx, target_id, &resource, client).await?;

        if !active && ctx.user_id == target_id {
            return Err(ServiceError::BadRequest(
                "You cannot deactivate your own account",
            ));
        }

        let after = self
            .store
            .update_user(
                target_id,
                &UserChanges {
                    is_active: Some(active),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !active {
            self.store.invalidate_refresh_tokens(target_id).await?;
        }

        let action = if active {
            AuditAction::UserActivated
        } else {
            AuditAction::UserDeactivated
        };

        self.audit
            .record(
                AuditEntry::new(ctx.org_id.clone(), Some(ctx.user_id.clone()), action)
                    .entity("USER", target_id)
                    .old_value(json!({ "isActive": before.is_active }))
                    .new_value(json!({ "isActive": after.is_active }))
                    .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(after.to_public())
    }

    /// Creates a user in the caller's organization with a one-time temporary password.
    pub async fn invite(
        &self,
        ctx: &AuthContext,
        name: String,
        email: String,
        role: Option<Role>,
        client: &ClientInfo,
    ) -> Result<(PublicUser, Password), ServiceError> {
        self.guard
            .prevent_privilege_escalation(ctx, role, "POST /users/invite", client)
            .await?;

        let temporary_password = generate_temporary_password(TEMPORARY_PASSWORD_LENGTH);

        let user = self
            .sessions
            .create_user(
                NewUser {
                    name,
                    email,
                    password: temporary_password.clone(),
                    org_id: ctx.org_id.clone(),
                    role,
                },
                Some(&ctx.user_id),
                AuditAction::UserInvited,
                client,
            )
            .await?;

        Ok((user.to_public(), temporary_password))
    }

    pub async fn activity_log(
        &self,
        ctx: &AuthContext,
        target_id: &str,
        limit: i64,
        client: &ClientInfo,
    ) -> Result<ActivityLogResponse, ServiceError> {
        let resource = format!("GET /users/{}/activity-log", target_id);
        self.load_in_tenant(ctx, target_id, &resource, client).await?;

        let entries = self
            .audit
            .find_for_user(&ctx.org_id, target_id, limit)
            .await?;

        Ok(ActivityLogResponse { entries })
    }

    pub async fn is_email_available(&self, email: &str) -> Result<bool, ServiceError> {
        Ok(self.store.find_user_by_email(email).await?.is_none())
    }
}
