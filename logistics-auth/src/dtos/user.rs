use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::{AuditEntry, PublicUser, Role, UserSummary};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_ACTIVITY_LIMIT: i64 = 50;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// Page size (default 20, max 100)
    pub limit: Option<i64>,
    /// Number of users to skip
    pub skip: Option<u64>,
}

impl ListUsersQuery {
    pub fn page(&self) -> (i64, u64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (limit, self.skip.unwrap_or(0))
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
    pub total: u64,
    pub limit: i64,
    pub skip: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    /// Only organization administrators may set this
    pub role: Option<Role>,

    /// Must match the caller's organization when present
    pub org_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InviteUserRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InviteUserResponse {
    pub user: PublicUser,
    /// Shown once; the user should change it after first login
    pub temporary_password: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ActivityLogQuery {
    /// Maximum entries to return (default 50, max 100)
    pub limit: Option<i64>,
}

impl ActivityLogQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityLogResponse {
    pub entries: Vec<AuditEntry>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmailAvailabilityResponse {
    pub email: String,
    pub available: bool,
}
