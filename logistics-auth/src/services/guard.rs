//! Per-request authorization checks.
//!
//! `authenticate` must run first; the remaining checks consume the
//! [`AuthContext`] it produces.

use serde_json::json;

use super::audit::{AuditTrail, ClientInfo};
use super::error::ServiceError;
use super::jwt::TokenCodec;
use super::policy::{self, Policy};
use crate::models::{AuditAction, AuditEntry, Role};

/// Identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: String,
    pub org_id: String,
    pub role: Role,
}

#[derive(Clone)]
pub struct AuthorizationGuard {
    tokens: TokenCodec,
    audit: AuditTrail,
}

impl AuthorizationGuard {
    pub fn new(tokens: TokenCodec, audit: AuditTrail) -> Self {
        Self { tokens, audit }
    }

    /// Validates an `Authorization: Bearer <token>` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext, ServiceError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ServiceError::Unauthenticated)?;

        let claims = self.tokens.verify_access(token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            ServiceError::Unauthenticated
        })?;

        Ok(AuthContext {
            user_id: claims.sub,
            org_id: claims.org_id,
            role: claims.role,
        })
    }

    /// Role membership check for a named policy.
    pub async fn authorize(
        &self,
        ctx: &AuthContext,
        policy: Policy,
        resource: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        if policy.permits(ctx.role) {
            return Ok(());
        }

        let required_roles = policy.allowed_roles().to_vec();
        tracing::warn!(
            user_id = %ctx.user_id,
            org_id = %ctx.org_id,
            role = %ctx.role,
            resource = %resource,
            "Authorization denied"
        );
        metrics::counter!("authz_denials_total", "reason" => "role").increment(1);

        self.audit
            .record(
                AuditEntry::new(
                    ctx.org_id.clone(),
                    Some(ctx.user_id.clone()),
                    AuditAction::UnauthorizedAccessAttempt,
                )
                .new_value(json!({
                    "resource": resource,
                    "requiredRoles": required_roles,
                    "userRole": ctx.role,
                }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Err(ServiceError::Forbidden { required_roles })
    }

    /// Rejects a non-empty organization reference that differs from the caller's.
    pub async fn validate_tenant_scope(
        &self,
        ctx: &AuthContext,
        requested_org_id: Option<&str>,
        resource: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let requested = match requested_org_id.map(str::trim) {
            Some(org) if !org.is_empty() => org,
            _ => return Ok(()),
        };

        if requested == ctx.org_id {
            return Ok(());
        }

        tracing::warn!(
            user_id = %ctx.user_id,
            caller_org = %ctx.org_id,
            requested_org = %requested,
            resource = %resource,
            "Cross-tenant access attempt"
        );
        metrics::counter!("authz_denials_total", "reason" => "tenant").increment(1);

        self.audit
            .record(
                AuditEntry::new(
                    ctx.org_id.clone(),
                    Some(ctx.user_id.clone()),
                    AuditAction::CrossTenantAccessAttempt,
                )
                .new_value(json!({
                    "resource": resource,
                    "requestedOrgId": requested,
                }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Err(ServiceError::CrossTenantAccess)
    }

    /// Rejects any attempt to set a role unless the caller may grant roles.
    pub async fn prevent_privilege_escalation(
        &self,
        ctx: &AuthContext,
        requested_role: Option<Role>,
        resource: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let Some(requested_role) = requested_role else {
            return Ok(());
        };

        if policy::can_assign_roles(ctx.role) {
            return Ok(());
        }

        tracing::warn!(
            user_id = %ctx.user_id,
            role = %ctx.role,
            requested_role = %requested_role,
            "Privilege escalation attempt"
        );
        metrics::counter!("authz_denials_total", "reason" => "escalation").increment(1);

        self.audit
            .record(
                AuditEntry::new(
                    ctx.org_id.clone(),
                    Some(ctx.user_id.clone()),
                    AuditAction::UnauthorizedAccessAttempt,
                )
                .new_value(json!({
                    "resource": resource,
                    "attemptedRole": requested_role,
                    "userRole": ctx.role,
                }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Err(ServiceError::PrivilegeEscalation(
            "Only org admins can assign roles",
        ))
    }
}
