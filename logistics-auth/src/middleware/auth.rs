use service_core::{
    axum::{
        async_trait,
        extract::{ConnectInfo, FromRequestParts, Request, State},
        http::{header, request::Parts},
        middleware::Next,
        response::Response,
    },
    error::AppError,
    middleware::rate_limit::client_ip,
};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::services::{AuthContext, ClientInfo, ServiceError};
use crate::AppState;

/// Requires a valid access token and stores the caller's [`AuthContext`]
/// in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let ctx = state.guard.authenticate(authorization)?;

    tracing::Span::current().record("user_id", ctx.user_id.as_str());
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

/// Extractor for the authenticated caller. Only valid behind [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ServiceError::Unauthenticated.into())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let ip = client_ip(&parts.headers, peer).map(|ip| ip.to_string());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ClientInfo::new(ip, user_agent))
    }
}
