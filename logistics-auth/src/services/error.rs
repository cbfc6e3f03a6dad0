use service_core::error::AppError;
use std::borrow::Cow;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::models::Role;

/// Single message for every credential failure so callers cannot probe for accounts.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend(anyhow::Error::new(err))
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation failed")]
    ValidationFailed(ValidationErrors),

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("{}", INVALID_CREDENTIALS)]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    IncorrectCurrentPassword,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Refresh token reuse detected")]
    TokenReuseDetected,

    #[error("Session changed concurrently")]
    SessionConflict,

    #[error("Insufficient permissions")]
    Forbidden { required_roles: Vec<Role> },

    #[error("{0}")]
    PrivilegeEscalation(&'static str),

    #[error("Cross-tenant access not permitted")]
    CrossTenantAccess,

    #[error("User not found")]
    UserNotFound,

    #[error("Organization not found")]
    OrganizationNotFound,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Field-level validation failure for a single field.
    pub fn invalid_field(field: &'static str, code: &'static str, message: String) -> Self {
        let mut errors = ValidationErrors::new();
        let mut err = ValidationError::new(code);
        err.message = Some(Cow::Owned(message));
        errors.add(field, err);
        ServiceError::ValidationFailed(errors)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => ServiceError::EmailAlreadyRegistered,
            StoreError::Backend(e) => ServiceError::Database(e),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::ValidationFailed(e) => AppError::ValidationError(e),
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!(INVALID_CREDENTIALS))
            }
            ServiceError::IncorrectCurrentPassword => {
                AppError::AuthError(anyhow::anyhow!("Current password is incorrect"))
            }
            ServiceError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::TokenReuseDetected => AppError::Unauthorized(anyhow::anyhow!(
                "Refresh token reuse detected. Please log in again."
            )),
            ServiceError::SessionConflict => AppError::Conflict(anyhow::anyhow!(
                "Session changed concurrently. Please retry."
            )),
            ServiceError::Forbidden { required_roles } => {
                let roles = required_roles
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                AppError::Forbidden(anyhow::anyhow!(
                    "Insufficient permissions. Required roles: {}",
                    roles
                ))
            }
            ServiceError::PrivilegeEscalation(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::CrossTenantAccess => {
                AppError::Forbidden(anyhow::anyhow!("Cross-tenant access not permitted"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::OrganizationNotFound => {
                AppError::NotFound(anyhow::anyhow!("Organization not found"))
            }
            ServiceError::BadRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
