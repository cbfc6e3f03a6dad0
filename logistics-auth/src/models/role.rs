//! Closed role set for organization members.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    OrgAdmin,
    RiskAnalyst,
    LogisticsOperator,
    InventoryManager,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::OrgAdmin,
        Role::RiskAnalyst,
        Role::LogisticsOperator,
        Role::InventoryManager,
        Role::Viewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::OrgAdmin => "ORG_ADMIN",
            Role::RiskAnalyst => "RISK_ANALYST",
            Role::LogisticsOperator => "LOGISTICS_OPERATOR",
            Role::InventoryManager => "INVENTORY_MANAGER",
            Role::Viewer => "VIEWER",
        }
    }

    /// The top administrative role of a tenant.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::OrgAdmin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Viewer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Invalid role: {}", s))
    }
}
