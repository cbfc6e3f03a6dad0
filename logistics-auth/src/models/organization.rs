use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    #[default]
    Starter,
    Professional,
    Enterprise,
}

/// Per-tenant policy defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSettings {
    /// Alert SLA in hours
    #[schema(example = 24)]
    pub alert_default_sla_hours: u32,
    #[schema(example = 30)]
    pub alert_cooldown_minutes: u32,
    /// Risk score recalculation interval in hours
    #[schema(example = 4)]
    pub risk_recalc_interval_hours: u32,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            alert_default_sla_hours: 24,
            alert_cooldown_minutes: 30,
            risk_recalc_interval_hours: 4,
        }
    }
}

/// Tenant boundary. Every user references exactly one organization.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub timezone: String,
    pub plan_tier: PlanTier,
    pub settings: OrganizationSettings,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(
        name: String,
        industry: Option<String>,
        country: Option<String>,
        timezone: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            industry,
            country,
            timezone: timezone
                .filter(|tz| !tz.trim().is_empty())
                .unwrap_or_else(|| "UTC".to_string()),
            plan_tier: PlanTier::default(),
            settings: OrganizationSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_organization_uses_policy_defaults() {
        let org = Organization::new("Acme Freight".to_string(), None, None, None);

        assert_eq!(org.timezone, "UTC");
        assert_eq!(org.plan_tier, PlanTier::Starter);
        assert_eq!(org.settings.alert_default_sla_hours, 24);
        assert_eq!(org.settings.alert_cooldown_minutes, 30);
        assert_eq!(org.settings.risk_recalc_interval_hours, 4);
    }
}
