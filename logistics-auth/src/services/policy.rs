//! Authorization and password policy.
//!
//! Every allowed-role list lives here. Route guards and services consult
//! [`Policy::allowed_roles`] instead of repeating role lists at call sites.

use std::borrow::Cow;
use validator::ValidationError;

use crate::models::Role;

pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_MAX_LENGTH: usize = 50;

/// Named authorization rules for protected operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// List, invite, (de)activate users and read their activity.
    ManageUsers,
    /// Change a user's role.
    AssignRoles,
    /// Edit tenant settings.
    ManageOrganization,
}

impl Policy {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Policy::ManageUsers | Policy::AssignRoles | Policy::ManageOrganization => {
                &[Role::OrgAdmin]
            }
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }
}

/// Whether `caller` may set role fields at all.
///
/// Binary admin check; a graded grant set would replace this if intermediate
/// admin tiers are introduced.
pub fn can_assign_roles(caller: Role) -> bool {
    Policy::AssignRoles.permits(caller)
}

/// Self-service or organization administrator.
pub fn can_manage_user(caller_id: &str, caller_role: Role, target_id: &str) -> bool {
    caller_id == target_id || caller_role.is_admin()
}

/// Errors related to password policy validation.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    PasswordTooShort { min_length: usize, actual_length: usize },
    PasswordTooLong { max_length: usize },
    PasswordMissingUppercase,
    PasswordMissingLowercase,
    PasswordMissingNumber,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::PasswordTooShort {
                min_length,
                actual_length,
            } => write!(
                f,
                "Password must be at least {} characters (got {})",
                min_length, actual_length
            ),
            PolicyError::PasswordTooLong { max_length } => {
                write!(f, "Password must be at most {} characters", max_length)
            }
            PolicyError::PasswordMissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            PolicyError::PasswordMissingLowercase => {
                write!(f, "Password must contain at least one lowercase letter")
            }
            PolicyError::PasswordMissingNumber => {
                write!(f, "Password must contain at least one number")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// 8-50 characters with at least one uppercase, one lowercase and one digit.
pub fn check_password_policy(password: &str) -> Result<(), PolicyError> {
    let length = password.chars().count();

    if length < PASSWORD_MIN_LENGTH {
        return Err(PolicyError::PasswordTooShort {
            min_length: PASSWORD_MIN_LENGTH,
            actual_length: length,
        });
    }

    if length > PASSWORD_MAX_LENGTH {
        return Err(PolicyError::PasswordTooLong {
            max_length: PASSWORD_MAX_LENGTH,
        });
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PolicyError::PasswordMissingUppercase);
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PolicyError::PasswordMissingLowercase);
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PolicyError::PasswordMissingNumber);
    }

    Ok(())
}

/// `validator` adapter for [`check_password_policy`].
pub fn validate_password_policy(password: &str) -> Result<(), ValidationError> {
    check_password_policy(password).map_err(|e| {
        let mut err = ValidationError::new("password_policy");
        err.message = Some(Cow::Owned(e.to_string()));
        err
    })
}
