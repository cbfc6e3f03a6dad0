use service_core::{
    axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use validator::Validate;

use crate::{
    dtos::user::{
        ActivityLogQuery, ActivityLogResponse, AssignRoleRequest, EmailAvailabilityResponse,
        InviteUserRequest, InviteUserResponse, ListUsersQuery, UpdateUserRequest,
        UserListResponse,
    },
    middleware::AuthUser,
    models::{normalize_email, PublicUser},
    services::ClientInfo,
    utils::ValidatedJson,
    AppState,
};

/// List users of the caller's organization
#[utoipa::path(
    get,
    path = "/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users in the caller's organization", body = UserListResponse),
        (status = 401, description = "Not authenticated", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Requires ORG_ADMIN", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    let (limit, skip) = query.page();
    Ok(Json(state.users.list_users(&ctx, limit, skip).await?))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = PublicUser),
        (status = 403, description = "Other tenant, or not self and not ORG_ADMIN", body = crate::dtos::ErrorResponse),
        (status = 404, description = "User not found", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    Path(user_id): Path<String>,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(state.users.get_user(&ctx, &user_id, &client).await?))
}

/// Update a user's profile
#[utoipa::path(
    put,
    path = "/users/{user_id}",
    params(("user_id" = String, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = PublicUser),
        (status = 400, description = "Validation error, or own role change", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Role change without ORG_ADMIN, or other tenant", body = crate::dtos::ErrorResponse),
        (status = 404, description = "User not found", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    Path(user_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(
        state
            .users
            .update_user(&ctx, &user_id, req, &client)
            .await?,
    ))
}

/// Assign a role to a user
#[utoipa::path(
    post,
    path = "/users/{user_id}/assign-role",
    params(("user_id" = String, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = PublicUser),
        (status = 400, description = "Cannot change own role", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Requires ORG_ADMIN", body = crate::dtos::ErrorResponse),
        (status = 404, description = "User not found", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    Path(user_id): Path<String>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(
        state
            .users
            .assign_role(&ctx, &user_id, req.role, &client)
            .await?,
    ))
}

/// Deactivate a user and revoke their refresh session
#[utoipa::path(
    post,
    path = "/users/{user_id}/deactivate",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deactivated", body = PublicUser),
        (status = 400, description = "Cannot deactivate yourself", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Requires ORG_ADMIN", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    Path(user_id): Path<String>,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(
        state
            .users
            .set_active(&ctx, &user_id, false, &client)
            .await?,
    ))
}

/// Reactivate a user
#[utoipa::path(
    post,
    path = "/users/{user_id}/activate",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User activated", body = PublicUser),
        (status = 403, description = "Requires ORG_ADMIN", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn activate_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    Path(user_id): Path<String>,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(
        state
            .users
            .set_active(&ctx, &user_id, true, &client)
            .await?,
    ))
}

/// Invite a user into the caller's organization
///
/// The temporary password is returned once and never stored in clear.
#[utoipa::path(
    post,
    path = "/users/invite",
    request_body = InviteUserRequest,
    responses(
        (status = 201, description = "User invited", body = InviteUserResponse),
        (status = 400, description = "Validation error", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Requires ORG_ADMIN", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn invite_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<InviteUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, temporary_password) = state
        .users
        .invite(&ctx, req.name, req.email, req.role, &client)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InviteUserResponse {
            user,
            temporary_password: temporary_password.as_str().to_string(),
        }),
    ))
}

/// Audit trail for a user
#[utoipa::path(
    get,
    path = "/users/{user_id}/activity-log",
    params(
        ("user_id" = String, Path, description = "User id"),
        ActivityLogQuery
    ),
    responses(
        (status = 200, description = "Entries newest first", body = ActivityLogResponse),
        (status = 403, description = "Requires ORG_ADMIN", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn activity_log(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    Path(user_id): Path<String>,
    Query(query): Query<ActivityLogQuery>,
) -> Result<Json<ActivityLogResponse>, AppError> {
    Ok(Json(
        state
            .users
            .activity_log(&ctx, &user_id, query.limit(), &client)
            .await?,
    ))
}

#[derive(Debug, Validate)]
struct EmailParam {
    #[validate(email(message = "Invalid email format"))]
    email: String,
}

/// Check whether an email is still available
#[utoipa::path(
    get,
    path = "/users/check-email/{email}",
    params(("email" = String, Path, description = "Email address")),
    responses(
        (status = 200, description = "Availability", body = EmailAvailabilityResponse),
        (status = 400, description = "Invalid email", body = crate::dtos::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::dtos::ErrorResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn check_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<EmailAvailabilityResponse>, AppError> {
    let param = EmailParam { email };
    param.validate()?;

    let email = normalize_email(&param.email);
    let available = state.users.is_email_available(&email).await?;

    Ok(Json(EmailAvailabilityResponse { email, available }))
}
