pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AuthConfig, Environment, SwaggerMode};
use crate::middleware::{auth_middleware, require_policy};
use crate::services::{
    AuditRecorder, AuditTrail, AuthorizationGuard, CredentialStore, OrganizationService, Policy,
    SessionManager, TokenCodec, UserService,
};
use crate::utils::PasswordHasher;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::change_password,
        handlers::auth::me,
        handlers::user::list_users,
        handlers::user::get_user,
        handlers::user::update_user,
        handlers::user::assign_role,
        handlers::user::deactivate_user,
        handlers::user::activate_user,
        handlers::user::invite_user,
        handlers::user::activity_log,
        handlers::user::check_email,
        handlers::organization::create_organization,
        handlers::organization::get_organization,
        handlers::organization::update_settings,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::RefreshRequest,
            dtos::auth::RefreshResponse,
            dtos::auth::ChangePasswordRequest,
            dtos::user::UserListResponse,
            dtos::user::UpdateUserRequest,
            dtos::user::AssignRoleRequest,
            dtos::user::InviteUserRequest,
            dtos::user::InviteUserResponse,
            dtos::user::ActivityLogResponse,
            dtos::user::EmailAvailabilityResponse,
            dtos::organization::CreateOrganizationRequest,
            dtos::organization::CreateOrganizationResponse,
            dtos::organization::UpdateOrganizationSettingsRequest,
            models::Role,
            models::PublicUser,
            models::UserSummary,
            models::Organization,
            models::OrganizationSettings,
            models::PlanTier,
            models::AuditAction,
            models::AuditEntry,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login and session management"),
        (name = "Users", description = "Tenant-scoped user administration"),
        (name = "Organizations", description = "Tenant onboarding and settings"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn CredentialStore>,
    pub audit: AuditTrail,
    pub sessions: SessionManager,
    pub guard: AuthorizationGuard,
    pub users: UserService,
    pub orgs: OrganizationService,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wires the services over the given store and audit sink.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        recorder: Arc<dyn AuditRecorder>,
    ) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(&config.password_hash).map_err(AppError::ConfigError)?;
        let tokens = TokenCodec::new(&config.jwt);
        let audit = AuditTrail::new(recorder);

        let sessions = SessionManager::new(store.clone(), hasher, tokens.clone(), audit.clone());
        let guard = AuthorizationGuard::new(tokens, audit.clone());
        let users = UserService::new(
            store.clone(),
            sessions.clone(),
            guard.clone(),
            audit.clone(),
        );
        let orgs = OrganizationService::new(
            store.clone(),
            sessions.clone(),
            guard.clone(),
            audit.clone(),
        );

        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let register_rate_limiter =
            create_ip_rate_limiter(limits.register_attempts, limits.register_window_seconds);
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Ok(Self {
            config,
            store,
            audit,
            sessions,
            guard,
            users,
            orgs,
            login_rate_limiter,
            register_rate_limiter,
            ip_rate_limiter,
        })
    }
}

fn cors_layer(config: &AuthConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route(
            "/organizations",
            post(handlers::organization::create_organization),
        )
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let authenticated_routes = Router::new()
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/users/:user_id",
            get(handlers::user::get_user).put(handlers::user::update_user),
        )
        .route(
            "/users/check-email/:email",
            get(handlers::user::check_email),
        )
        .route(
            "/organizations/:org_id",
            get(handlers::organization::get_organization),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let user_admin_routes = Router::new()
        .route("/users", get(handlers::user::list_users))
        .route("/users/invite", post(handlers::user::invite_user))
        .route(
            "/users/:user_id/assign-role",
            post(handlers::user::assign_role),
        )
        .route(
            "/users/:user_id/deactivate",
            post(handlers::user::deactivate_user),
        )
        .route(
            "/users/:user_id/activate",
            post(handlers::user::activate_user),
        )
        .route(
            "/users/:user_id/activity-log",
            get(handlers::user::activity_log),
        )
        .route_layer(from_fn_with_state(state.clone(), |state, req, next| {
            require_policy(state, Policy::ManageUsers, req, next)
        }))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let org_admin_routes = Router::new()
        .route(
            "/organizations/:org_id/settings",
            patch(handlers::organization::update_settings),
        )
        .route_layer(from_fn_with_state(state.clone(), |state, req, next| {
            require_policy(state, Policy::ManageOrganization, req, next)
        }))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        Environment::Dev => true,
        Environment::Prod => state.config.swagger.enabled != SwaggerMode::Disabled,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .merge(login_route)
        .merge(register_routes)
        .merge(authenticated_routes)
        .merge(user_admin_routes)
        .merge(org_admin_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config));

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_responses_reference_the_shared_schema() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();

        assert!(doc["components"]["schemas"]["ErrorResponse"].is_object());
        for (path, method, status) in [
            ("/auth/login", "post", "401"),
            ("/users/{user_id}", "put", "403"),
            ("/organizations/{org_id}/settings", "patch", "400"),
            ("/users/check-email/{email}", "get", "401"),
        ] {
            assert_eq!(
                doc["paths"][path][method]["responses"][status]["content"]["application/json"]
                    ["schema"]["$ref"],
                "#/components/schemas/ErrorResponse",
                "{method} {path} {status}"
            );
        }
    }
}
