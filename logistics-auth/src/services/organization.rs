use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use super::audit::{AuditTrail, ClientInfo};
use super::error::ServiceError;
use super::guard::{AuthContext, AuthorizationGuard};
use super::session::{NewUser, SessionManager};
use super::store::CredentialStore;
use crate::dtos::organization::{CreateOrganizationRequest, UpdateOrganizationSettingsRequest};
use crate::models::{AuditAction, AuditEntry, Organization, PublicUser, Role};
use crate::utils::Password;

#[derive(Clone)]
pub struct OrganizationService {
    store: Arc<dyn CredentialStore>,
    sessions: SessionManager,
    guard: AuthorizationGuard,
    audit: AuditTrail,
}

impl OrganizationService {
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

    /// Onboards a tenant together with its first administrator.
    pub async fn create(
        &self,
        req: CreateOrganizationRequest,
        client: &ClientInfo,
    ) -> Result<(Organization, PublicUser), ServiceError> {
        if self
            .store
            .find_user_by_email(&req.admin_email)
            .await?
            .is_some()
        {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let org = Organization::new(req.name, req.industry, req.country, req.timezone);
        self.store.insert_organization(&org).await?;

        // TODO: remove the organization again if admin creation fails once the store supports deletes
        let admin = self
            .sessions
            .create_user(
                NewUser {
                    name: req.admin_name,
                    email: req.admin_email,
                    password: Password::new(req.admin_password),
                    org_id: org.id.clone(),
                    role: Some(Role::OrgAdmin),
                },
                None,
                AuditAction::UserRegistered,
                client,
            )
            .await?;

        tracing::info!(org_id = %org.id, admin_id = %admin.id, "Organization created");

        self.audit
            .record(
                AuditEntry::new(
                    org.id.clone(),
                    Some(admin.id.clone()),
                    AuditAction::OrganizationCreated,
                )
                .entity("ORGANIZATION", org.id.clone())
                .new_value(json!({ "name": org.name, "planTier": org.plan_tier }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok((org, admin.to_public()))
    }

    pub async fn get(
        &self,
        ctx: &AuthContext,
        org_id: &str,
        client: &ClientInfo,
    ) -> Result<Organization, ServiceError> {
        self.guard
            .validate_tenant_scope(
                ctx,
                Some(org_id),
                &format!("GET /organizations/{}", org_id),
                client,
            )
            .await?;

        self.store
            .find_organization(org_id)
            .await?
            .ok_or(ServiceError::OrganizationNotFound)
    }

    pub async fn update_settings(
        &self,
        ctx: &AuthContext,
        org_id: &str,
        req: UpdateOrganizationSettingsRequest,
        client: &ClientInfo,
    ) -> Result<Organization, ServiceError> {
        self.guard
            .validate_tenant_scope(
                ctx,
                Some(org_id),
                &format!("PATCH /organizations/{}/settings", org_id),
                client,
            )
            .await?;

        let before = self
            .store
            .find_organization(org_id)
            .await?
            .ok_or(ServiceError::OrganizationNotFound)?;

        let mut after = before.clone();
        if let Some(hours) = req.alert_default_sla_hours {
            after.settings.alert_default_sla_hours = hours;
        }
        if let Some(minutes) = req.alert_cooldown_minutes {
            after.settings.alert_cooldown_minutes = minutes;
        }
        if let Some(hours) = req.risk_recalc_interval_hours {
            after.settings.risk_recalc_interval_hours = hours;
        }
        if let Some(tz) = req.timezone {
            after.timezone = tz;
        }
        after.updated_at = Utc::now();

        if !self.store.update_organization(&after).await? {
            return Err(ServiceError::OrganizationNotFound);
        }

        self.audit
            .record(
                AuditEntry::new(
                    org_id,
                    Some(ctx.user_id.clone()),
                    AuditAction::OrganizationUpdated,
                )
                .entity("ORGANIZATION", org_id)
                .old_value(json!({ "settings": before.settings, "timezone": before.timezone }))
                .new_value(json!({ "settings": after.settings, "timezone": after.timezone }))
                .client(client.ip.clone(), client.user_agent.clone()),
            )
            .await;

        Ok(after)
    }
}
