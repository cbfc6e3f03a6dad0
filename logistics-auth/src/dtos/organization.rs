use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Organization, PublicUser};
use crate::services::policy::validate_password_policy;

/// Onboarding request: a new tenant and its first administrator.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    #[schema(example = "Acme Freight")]
    pub name: String,

    #[schema(example = "Logistics")]
    pub industry: Option<String>,

    #[schema(example = "DE")]
    pub country: Option<String>,

    #[schema(example = "Europe/Berlin")]
    pub timezone: Option<String>,

    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    #[schema(example = "Alice Smith")]
    pub admin_name: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@demo.org")]
    pub admin_email: String,

    #[validate(custom(function = "validate_password_policy"))]
    #[schema(example = "Passw0rd!", min_length = 8, max_length = 50)]
    pub admin_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrganizationResponse {
    pub organization: Organization,
    pub admin: PublicUser,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrganizationSettingsRequest {
    #[validate(range(min = 1, max = 720, message = "Alert SLA must be 1-720 hours"))]
    pub alert_default_sla_hours: Option<u32>,

    #[validate(range(min = 1, max = 1440, message = "Alert cooldown must be 1-1440 minutes"))]
    pub alert_cooldown_minutes: Option<u32>,

    #[validate(range(min = 1, max = 168, message = "Recalculation interval must be 1-168 hours"))]
    pub risk_recalc_interval_hours: Option<u32>,

    #[validate(length(min = 1, max = 64, message = "Timezone must be 1-64 characters"))]
    pub timezone: Option<String>,
}
