use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};

use crate::{
    dtos::organization::{
        CreateOrganizationRequest, CreateOrganizationResponse, UpdateOrganizationSettingsRequest,
    },
    middleware::AuthUser,
    models::Organization,
    services::ClientInfo,
    utils::ValidatedJson,
    AppState,
};

/// Onboard a new organization and its first administrator
#[utoipa::path(
    post,
    path = "/organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = CreateOrganizationResponse),
        (status = 400, description = "Validation error", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Admin email already registered", body = crate::dtos::ErrorResponse),
        (status = 429, description = "Too many attempts", body = crate::dtos::ErrorResponse)
    ),
    tag = "Organizations"
)]
pub async fn create_organization(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (organization, admin) = state.orgs.create(req, &client).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrganizationResponse {
            organization,
            admin,
        }),
    ))
}

/// Get the caller's organization
#[utoipa::path(
    get,
    path = "/organizations/{org_id}",
    params(("org_id" = String, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization", body = Organization),
        (status = 403, description = "Cross-tenant access", body = crate::dtos::ErrorResponse),
        (status = 404, description = "Organization not found", body = crate::dtos::ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn get_organization(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    Path(org_id): Path<String>,
) -> Result<Json<Organization>, AppError> {
    Ok(Json(state.orgs.get(&ctx, &org_id, &client).await?))
}

/// Update tenant policy defaults
#[utoipa::path(
    patch,
    path = "/organizations/{org_id}/settings",
    params(("org_id" = String, Path, description = "Organization id")),
    request_body = UpdateOrganizationSettingsRequest,
    responses(
        (status = 200, description = "Updated organization", body = Organization),
        (status = 400, description = "Validation error", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Requires ORG_ADMIN of this organization", body = crate::dtos::ErrorResponse)
    ),
    tag = "Organizations",
    security(("bearer_auth" = []))
)]
pub async fn update_settings(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    client: ClientInfo,
    Path(org_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateOrganizationSettingsRequest>,
) -> Result<Json<Organization>, AppError> {
    Ok(Json(
        state
            .orgs
            .update_settings(&ctx, &org_id, req, &client)
            .await?,
    ))
}
