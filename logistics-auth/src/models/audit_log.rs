use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Audit retention window; entries expire automatically afterwards.
pub const AUDIT_RETENTION_SECONDS: u64 = 90 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UserRegistered,
    Login,
    Logout,
    TokenRefreshed,
    RefreshTokenReuseDetected,
    PasswordChanged,
    UnauthorizedAccessAttempt,
    CrossTenantAccessAttempt,
    UserUpdated,
    RoleAssigned,
    UserDeactivated,
    UserActivated,
    UserInvited,
    OrganizationCreated,
    OrganizationUpdated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegistered => "USER_REGISTERED",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::TokenRefreshed => "TOKEN_REFRESHED",
            AuditAction::RefreshTokenReuseDetected => "REFRESH_TOKEN_REUSE_DETECTED",
            AuditAction::PasswordChanged => "PASSWORD_CHANGED",
            AuditAction::UnauthorizedAccessAttempt => "UNAUTHORIZED_ACCESS_ATTEMPT",
            AuditAction::CrossTenantAccessAttempt => "CROSS_TENANT_ACCESS_ATTEMPT",
            AuditAction::UserUpdated => "USER_UPDATED",
            AuditAction::RoleAssigned => "ROLE_ASSIGNED",
            AuditAction::UserDeactivated => "USER_DEACTIVATED",
            AuditAction::UserActivated => "USER_ACTIVATED",
            AuditAction::UserInvited => "USER_INVITED",
            AuditAction::OrganizationCreated => "ORGANIZATION_CREATED",
            AuditAction::OrganizationUpdated => "ORGANIZATION_UPDATED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable security event record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub org_id: String,
    pub user_id: Option<String>,
    pub action: AuditAction,
    #[schema(example = "USER")]
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub old_value: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub new_value: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(org_id: impl Into<String>, user_id: Option<String>, action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.into(),
            user_id,
            action,
            entity_type: None,
            entity_id: None,
            old_value: None,
            new_value: None,
            ip_address: None,
            user_agent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn old_value(mut self, value: serde_json::Value) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn new_value(mut self, value: serde_json::Value) -> Self {
        self.new_value = Some(value);
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    /// True when `user_id` acted or was acted upon.
    pub fn concerns_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
            || (self.entity_type.as_deref() == Some("USER")
                && self.entity_id.as_deref() == Some(user_id))
    }
}
