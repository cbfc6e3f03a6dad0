mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{TestApp, PASSWORD};
use logistics_auth::models::{AuditAction, Role};
use logistics_auth::services::CredentialStore;
use serde_json::json;

async fn app_with_alice() -> TestApp {
    let app = TestApp::new().await;
    app.seed_org("O1").await;
    app.seed_user("O1", "alice@demo.org", Role::Viewer).await;
    app
}

fn count(app: &TestApp, action: AuditAction) -> usize {
    app.audit_actions().iter().filter(|a| **a == action).count()
}

#[tokio::test]
async fn refresh_rotates_both_tokens() {
    let app = app_with_alice().await;
    let session = app.login("alice@demo.org", PASSWORD).await;

    let first = app
        .refresh(&session.access_token, &session.refresh_token)
        .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    assert_eq!(first.body["tokenType"], "Bearer");
    let rotated = first.refresh_cookie().expect("rotated cookie missing");
    assert_ne!(rotated, session.refresh_token);
    assert!(first.set_cookie().unwrap().contains("HttpOnly"));

    let access = first.body["accessToken"].as_str().unwrap().to_string();
    let second = app.refresh(&access, &rotated).await;
    assert_eq!(second.status, StatusCode::OK, "{}", second.body);

    let user = app
        .store
        .find_user_by_id(&session.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.refresh_token_version, 2);
    assert_eq!(count(&app, AuditAction::TokenRefreshed), 2);
}

#[tokio::test]
async fn reusing_a_rotated_token_revokes_the_session() {
    let app = app_with_alice().await;
    let session = app.login("alice@demo.org", PASSWORD).await;

    let rotated = app
        .refresh(&session.access_token, &session.refresh_token)
        .await;
    assert_eq!(rotated.status, StatusCode::OK);
    let new_refresh = rotated.refresh_cookie().unwrap();

    let replay = app
        .refresh(&session.access_token, &session.refresh_token)
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        replay.error(),
        "Refresh token reuse detected. Please log in again."
    );
    assert_eq!(replay.refresh_cookie().as_deref(), Some(""));
    assert_eq!(count(&app, AuditAction::RefreshTokenReuseDetected), 1);

    let user = app
        .store
        .find_user_by_id(&session.user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(user.refresh_token_fingerprint.is_none());

    // the legitimate rotated token died with the session
    let after = app.refresh(&session.access_token, &new_refresh).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);

    // a fresh login starts a new session
    let again = app.login("alice@demo.org", PASSWORD).await;
    let ok = app.refresh(&again.access_token, &again.refresh_token).await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn concurrent_refresh_has_exactly_one_winner() {
    let app = app_with_alice().await;
    let session = app.login("alice@demo.org", PASSWORD).await;

    let (a, b) = tokio::join!(
        app.refresh(&session.access_token, &session.refresh_token),
        app.refresh(&session.access_token, &session.refresh_token),
    );

    let statuses = [a.status, b.status];
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "statuses: {statuses:?}"
    );
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::UNAUTHORIZED)
            .count(),
        1
    );
    assert_eq!(count(&app, AuditAction::RefreshTokenReuseDetected), 1);
}

#[tokio::test]
async fn refresh_token_may_come_from_the_body() {
    let app = app_with_alice().await;
    let session = app.login("alice@demo.org", PASSWORD).await;

    let res = app
        .post(
            "/auth/refresh",
            json!({ "refreshToken": session.refresh_token }),
            Some(&session.access_token),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert!(res.refresh_cookie().is_some());
}

#[tokio::test]
async fn refresh_rejects_missing_and_mismatched_tokens() {
    let app = app_with_alice().await;
    app.seed_user("O1", "bob@demo.org", Role::Viewer).await;
    let alice = app.login("alice@demo.org", PASSWORD).await;
    let bob = app.login("bob@demo.org", PASSWORD).await;

    let missing = app
        .request("POST", "/auth/refresh", None, Some(&alice.access_token))
        .await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    // access token presented as a refresh token
    let wrong_class = app.refresh(&alice.access_token, &alice.access_token).await;
    assert_eq!(wrong_class.status, StatusCode::UNAUTHORIZED);

    // refresh token presented as an access token
    let as_bearer = app.get("/auth/me", Some(&alice.refresh_token)).await;
    assert_eq!(as_bearer.status, StatusCode::UNAUTHORIZED);

    // bob's refresh token with alice's identity
    let foreign = app.refresh(&alice.access_token, &bob.refresh_token).await;
    assert_eq!(foreign.status, StatusCode::UNAUTHORIZED);

    // no session was revoked by these rejections
    assert_eq!(count(&app, AuditAction::RefreshTokenReuseDetected), 0);
    let ok = app.refresh(&bob.access_token, &bob.refresh_token).await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn logout_clears_cookie_and_invalidates_refresh() {
    let app = app_with_alice().await;
    let session = app.login("alice@demo.org", PASSWORD).await;

    let req = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", session.access_token),
        )
        .header(
            header::COOKIE,
            format!("refreshToken={}", session.refresh_token),
        )
        .body(Body::empty())
        .unwrap();
    let res = app.send(req).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "Logged out successfully");
    assert_eq!(res.refresh_cookie().as_deref(), Some(""));
    assert!(app.audit_actions().contains(&AuditAction::Logout));

    let refresh = app
        .refresh(&session.access_token, &session.refresh_token)
        .await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_revokes_refresh_tokens() {
    let app = app_with_alice().await;
    let session = app.login("alice@demo.org", PASSWORD).await;

    let wrong = app
        .post(
            "/auth/change-password",
            json!({ "currentPassword": "Wrong0ne!", "newPassword": "N3wPassword" }),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.error(), "Current password is incorrect");

    let same = app
        .post(
            "/auth/change-password",
            json!({ "currentPassword": PASSWORD, "newPassword": PASSWORD }),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(same.status, StatusCode::BAD_REQUEST);

    let weak = app
        .post(
            "/auth/change-password",
            json!({ "currentPassword": PASSWORD, "newPassword": "short" }),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);

    let changed = app
        .post(
            "/auth/change-password",
            json!({ "currentPassword": PASSWORD, "newPassword": "N3wPassword" }),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(changed.status, StatusCode::OK, "{}", changed.body);
    assert!(app.audit_actions().contains(&AuditAction::PasswordChanged));

    let refresh = app
        .refresh(&session.access_token, &session.refresh_token)
        .await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);

    let old = app
        .post(
            "/auth/login",
            json!({ "email": "alice@demo.org", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);

    app.login("alice@demo.org", "N3wPassword").await;
}

#[tokio::test]
async fn second_login_supersedes_the_first_session() {
    let app = app_with_alice().await;
    let first = app.login("alice@demo.org", PASSWORD).await;
    let second = app.login("alice@demo.org", PASSWORD).await;

    let stale = app.refresh(&first.access_token, &first.refresh_token).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    let again = app.login("alice@demo.org", PASSWORD).await;
    assert_ne!(again.refresh_token, second.refresh_token);
    let ok = app.refresh(&again.access_token, &again.refresh_token).await;
    assert_eq!(ok.status, StatusCode::OK);
}
