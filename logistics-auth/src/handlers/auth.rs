use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::{
        auth::{
            ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse,
            RegisterRequest,
        },
        MessageResponse,
    },
    middleware::AuthUser,
    models::PublicUser,
    services::{ClientInfo, NewUser, ServiceError},
    utils::{Password, ValidatedJson},
    AppState,
};

pub const REFRESH_COOKIE: &str = "refreshToken";

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .secure(state.config.security.cookie_secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::days(
            state.config.jwt.refresh_token_expiry_days,
        ))
        .build()
}

fn clear_refresh_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

/// Register a user in an existing organization
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = PublicUser),
        (status = 400, description = "Validation error", body = crate::dtos::ErrorResponse),
        (status = 404, description = "Organization not found", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::dtos::ErrorResponse),
        (status = 429, description = "Too many attempts", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .sessions
        .register(
            NewUser {
                name: req.name,
                email: req.email,
                password: Password::new(req.password),
                org_id: req.org_id,
                role: None,
            },
            &client,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(user.to_public())))
}

/// Login with email and password
///
/// The refresh token is set as an HTTP-only cookie and is not part of the body.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Validation error", body = crate::dtos::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Concurrent login for the same account", body = crate::dtos::ErrorResponse),
        (status = 429, description = "Too many attempts", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .sessions
        .login(&req.email, &Password::new(req.password), &client)
        .await?;

    let jar = jar.add(refresh_cookie(&state, outcome.tokens.refresh_token));

    Ok((
        jar,
        Json(LoginResponse {
            access_token: outcome.tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.sessions.tokens().access_token_expiry_seconds(),
            user: outcome.user,
        }),
    ))
}

/// Rotate the refresh token and issue a new access token
///
/// The refresh token is read from the `refreshToken` cookie, falling back to
/// the request body. A reused token revokes the session.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body(content = RefreshRequest, description = "Optional when the cookie is present"),
    responses(
        (status = 200, description = "Token refreshed", body = RefreshResponse),
        (status = 401, description = "Invalid or reused refresh token", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn refresh(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    jar: CookieJar,
    client: ClientInfo,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<RefreshResponse>), (CookieJar, AppError)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .filter(|t| !t.is_empty());

    let Some(presented) = presented else {
        return Err((jar, ServiceError::InvalidToken.into()));
    };

    match state
        .sessions
        .refresh_access_token(&presented, &ctx.user_id, &ctx.org_id, &client)
        .await
    {
        Ok(tokens) => {
            let jar = jar.add(refresh_cookie(&state, tokens.refresh_token));
            Ok((
                jar,
                Json(RefreshResponse {
                    access_token: tokens.access_token,
                    token_type: "Bearer".to_string(),
                    expires_in: state.sessions.tokens().access_token_expiry_seconds(),
                }),
            ))
        }
        Err(e @ ServiceError::TokenReuseDetected) => Err((clear_refresh_cookie(jar), e.into())),
        Err(e) => Err((jar, e.into())),
    }
}

/// Logout and revoke the refresh session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    jar: CookieJar,
    client: ClientInfo,
) -> Result<impl IntoResponse, AppError> {
    state
        .sessions
        .logout(&ctx.user_id, &ctx.org_id, &client)
        .await?;

    Ok((
        clear_refresh_cookie(jar),
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// Change the caller's password
///
/// All refresh tokens are revoked; the caller must log in again to obtain one.
#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Validation error", body = crate::dtos::ErrorResponse),
        (status = 401, description = "Current password is incorrect", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    jar: CookieJar,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .sessions
        .change_password(
            &ctx.user_id,
            &Password::new(req.current_password),
            &Password::new(req.new_password),
            &client,
        )
        .await?;

    Ok((
        clear_refresh_cookie(jar),
        Json(MessageResponse::new("Password changed successfully")),
    ))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Authenticated user", body = PublicUser),
        (status = 401, description = "Not authenticated", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(state.sessions.current_user(&ctx.user_id).await?))
}
