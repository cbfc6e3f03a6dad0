pub mod audit_log;
pub mod organization;
pub mod role;
pub mod user;

pub use audit_log::{AuditAction, AuditEntry, AUDIT_RETENTION_SECONDS};
pub use organization::{Organization, OrganizationSettings, PlanTier};
pub use role::Role;
pub use user::{normalize_email, PublicUser, User, UserChanges, UserSummary};
