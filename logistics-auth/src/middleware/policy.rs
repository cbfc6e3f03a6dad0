use service_core::{
    axum::{
        extract::{FromRequestParts, Request, State},
        middleware::Next,
        response::Response,
    },
    error::AppError,
};

use crate::services::{AuthContext, ClientInfo, Policy, ServiceError};
use crate::AppState;

/// Route-level role check. Layer it inside [`super::auth_middleware`]:
///
/// ```ignore
/// .route_layer(from_fn_with_state(state.clone(), |state, req, next| {
///     require_policy(state, Policy::ManageUsers, req, next)
/// }))
/// ```
pub async fn require_policy(
    State(state): State<AppState>,
    policy: Policy,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or(ServiceError::Unauthenticated)?;

    let resource = format!("{} {}", req.method(), req.uri().path());

    let (mut parts, body) = req.into_parts();
    let client = match ClientInfo::from_request_parts(&mut parts, &state).await {
        Ok(client) => client,
        Err(never) => match never {},
    };

    state
        .guard
        .authorize(&ctx, policy, &resource, &client)
        .await?;

    Ok(next.run(Request::from_parts(parts, body)).await)
}
