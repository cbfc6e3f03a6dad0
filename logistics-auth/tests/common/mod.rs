//! Shared setup for logistics-auth integration tests.
//!
//! Tests run the full router over the in-memory credential store and audit
//! log, so no database is required.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use logistics_auth::{
    build_router,
    config::{
        AuthConfig, Environment, JwtConfig, MongoConfig, PasswordHashConfig, RateLimitConfig,
        SecurityConfig, SwaggerConfig, SwaggerMode,
    },
    models::{AuditAction, AuditEntry, Organization, Role, User},
    services::{
        AuditRecorder, ClientInfo, CredentialStore, InMemoryAuditLog, InMemoryCredentialStore,
        NewUser,
    },
    utils::Password,
    AppState,
};
use secrecy::Secret;
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "Passw0rd!";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        environment: Environment::Dev,
        service_name: "logistics-auth".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        mongodb: MongoConfig {
            uri: "mongodb://unused".to_string(),
            database: "unused".to_string(),
        },
        jwt: JwtConfig {
            access_secret: Secret::new("test-access-secret-0123456789abcdef".to_string()),
            refresh_secret: Secret::new("test-refresh-secret-0123456789abcdef".to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        // minimal Argon2 cost keeps the suite fast
        password_hash: PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            cookie_secure: true,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            register_attempts: 1000,
            register_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

/// Audit sink that is always down.
pub struct FailingAuditRecorder;

#[async_trait]
impl AuditRecorder for FailingAuditRecorder {
    async fn record(&self, _entry: &AuditEntry) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("audit sink unavailable"))
    }

    async fn find_for_user(
        &self,
        _org_id: &str,
        _user_id: &str,
        _limit: i64,
    ) -> Result<Vec<AuditEntry>, anyhow::Error> {
        Err(anyhow::anyhow!("audit sink unavailable"))
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Value of the `refreshToken` cookie set by this response, if any.
    pub fn refresh_cookie(&self) -> Option<String> {
        self.set_cookie()
            .and_then(|c| c.split(';').next().map(str::to_string))
            .and_then(|pair| pair.strip_prefix("refreshToken=").map(str::to_string))
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("refreshToken="))
            .map(str::to_string)
    }

    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryCredentialStore>,
    pub audit: Arc<InMemoryAuditLog>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AuthConfig) -> Self {
        let audit = Arc::new(InMemoryAuditLog::new());
        let (router, state, store) = Self::build(config, audit.clone()).await;
        Self {
            router,
            state,
            store,
            audit,
        }
    }

    /// App whose audit sink rejects every write. `audit` stays empty.
    pub async fn with_failing_audit() -> Self {
        let (router, state, store) =
            Self::build(test_config(), Arc::new(FailingAuditRecorder)).await;
        Self {
            router,
            state,
            store,
            audit: Arc::new(InMemoryAuditLog::new()),
        }
    }

    async fn build(
        config: AuthConfig,
        recorder: Arc<dyn AuditRecorder>,
    ) -> (Router, AppState, Arc<InMemoryCredentialStore>) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let state = AppState::new(config, store.clone(), recorder).expect("Failed to build state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");
        (router, state, store)
    }

    pub async fn seed_org(&self, id: &str) -> Organization {
        let mut org = Organization::new(format!("Org {id}"), None, None, None);
        org.id = id.to_string();
        self.store
            .insert_organization(&org)
            .await
            .expect("Failed to seed organization");
        org
    }

    pub async fn seed_user(&self, org_id: &str, email: &str, role: Role) -> User {
        self.state
            .sessions
            .register(
                NewUser {
                    name: "Test User".to_string(),
                    email: email.to_string(),
                    password: Password::new(PASSWORD),
                    org_id: org_id.to_string(),
                    role: Some(role),
                },
                &ClientInfo::default(),
            )
            .await
            .expect("Failed to seed user")
    }

    pub async fn login(&self, email: &str, password: &str) -> Session {
        let res = self
            .post(
                "/auth/login",
                serde_json::json!({ "email": email, "password": password }),
                None,
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.body);
        Session {
            access_token: res.body["accessToken"]
                .as_str()
                .expect("accessToken missing")
                .to_string(),
            refresh_token: res.refresh_cookie().expect("refresh cookie missing"),
            user_id: res.body["user"]["id"]
                .as_str()
                .expect("user id missing")
                .to_string(),
        }
    }

    pub fn audit_actions(&self) -> Vec<AuditAction> {
        self.audit.entries().iter().map(|e| e.action).collect()
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(req).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request("GET", uri, None, token).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request("POST", uri, Some(body), token).await
    }

    pub async fn put(&self, uri: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request("PUT", uri, Some(body), token).await
    }

    pub async fn patch(&self, uri: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request("PATCH", uri, Some(body), token).await
    }

    /// `POST /auth/refresh` with the refresh token in the cookie.
    pub async fn refresh(&self, access_token: &str, refresh_token: &str) -> TestResponse {
        let req = Request::builder()
            .method("POST")
            .uri("/auth/refresh")
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .header(header::COOKIE, format!("refreshToken={refresh_token}"))
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(req).await
    }
}
