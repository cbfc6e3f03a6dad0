mod common;

use axum::http::StatusCode;
use common::{TestApp, PASSWORD};
use logistics_auth::models::{AuditAction, Role};
use logistics_auth::services::CredentialStore;
use serde_json::json;

struct Fixture {
    app: TestApp,
    admin_id: String,
    admin_token: String,
    viewer_id: String,
}

async fn fixture() -> Fixture {
    let app = TestApp::new().await;
    app.seed_org("O1").await;
    app.seed_org("O2").await;
    let admin = app.seed_user("O1", "admin@demo.org", Role::OrgAdmin).await;
    let viewer = app.seed_user("O1", "viewer@demo.org", Role::Viewer).await;
    let session = app.login("admin@demo.org", PASSWORD).await;

    Fixture {
        app,
        admin_id: admin.id,
        admin_token: session.access_token,
        viewer_id: viewer.id,
    }
}

#[tokio::test]
async fn invited_user_can_log_in_with_temporary_password() {
    let f = fixture().await;

    let res = f
        .app
        .post(
            "/users/invite",
            json!({ "name": "Rita", "email": "rita@demo.org", "role": "RISK_ANALYST" }),
            Some(&f.admin_token),
        )
        .await;

    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    assert_eq!(res.body["user"]["role"], "RISK_ANALYST");
    assert_eq!(res.body["user"]["orgId"], "O1");
    let temporary = res.body["temporaryPassword"].as_str().unwrap();
    assert_eq!(temporary.chars().count(), 12);

    let session = f.app.login("rita@demo.org", temporary).await;
    assert!(!session.access_token.is_empty());

    let invited = f
        .app
        .audit
        .entries()
        .into_iter()
        .find(|e| e.action == AuditAction::UserInvited)
        .expect("invite not audited");
    assert_eq!(invited.user_id.as_deref(), Some(f.admin_id.as_str()));
}

#[tokio::test]
async fn viewer_cannot_invite() {
    let f = fixture().await;
    let viewer = f.app.login("viewer@demo.org", PASSWORD).await;

    let res = f
        .app
        .post(
            "/users/invite",
            json!({ "name": "Eve", "email": "eve@demo.org" }),
            Some(&viewer.access_token),
        )
        .await;

    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(f
        .app
        .store
        .find_user_by_email("eve@demo.org")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn assign_role_records_old_and_new_values() {
    let f = fixture().await;

    let res = f
        .app
        .post(
            &format!("/users/{}/assign-role", f.viewer_id),
            json!({ "role": "LOGISTICS_OPERATOR" }),
            Some(&f.admin_token),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["role"], "LOGISTICS_OPERATOR");

    let entry = f
        .app
        .audit
        .entries()
        .into_iter()
        .find(|e| e.action == AuditAction::RoleAssigned)
        .expect("role assignment not audited");
    assert_eq!(entry.entity_id.as_deref(), Some(f.viewer_id.as_str()));
    assert_eq!(entry.old_value.unwrap()["role"], "VIEWER");
    assert_eq!(entry.new_value.unwrap()["role"], "LOGISTICS_OPERATOR");

    let own = f
        .app
        .post(
            &format!("/users/{}/assign-role", f.admin_id),
            json!({ "role": "VIEWER" }),
            Some(&f.admin_token),
        )
        .await;
    assert_eq!(own.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deactivation_blocks_login_and_refresh() {
    let f = fixture().await;
    let viewer = f.app.login("viewer@demo.org", PASSWORD).await;

    let res = f
        .app
        .post(
            &format!("/users/{}/deactivate", f.viewer_id),
            json!({}),
            Some(&f.admin_token),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert!(f.app.audit_actions().contains(&AuditAction::UserDeactivated));

    let refresh = f
        .app
        .refresh(&viewer.access_token, &viewer.refresh_token)
        .await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);

    let login = f
        .app
        .post(
            "/auth/login",
            json!({ "email": "viewer@demo.org", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);

    let res = f
        .app
        .post(
            &format!("/users/{}/activate", f.viewer_id),
            json!({}),
            Some(&f.admin_token),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(f.app.audit_actions().contains(&AuditAction::UserActivated));
    f.app.login("viewer@demo.org", PASSWORD).await;
}

#[tokio::test]
async fn admin_cannot_deactivate_themself() {
    let f = fixture().await;

    let res = f
        .app
        .post(
            &format!("/users/{}/deactivate", f.admin_id),
            json!({}),
            Some(&f.admin_token),
        )
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let admin = f
        .app
        .store
        .find_user_by_id(&f.admin_id)
        .await
        .unwrap()
        .unwrap();
    assert!(admin.is_active);
}

#[tokio::test]
async fn activity_log_is_newest_first_and_tenant_scoped() {
    let f = fixture().await;
    f.app.login("viewer@demo.org", PASSWORD).await;
    f.app
        .post(
            &format!("/users/{}/assign-role", f.viewer_id),
            json!({ "role": "INVENTORY_MANAGER" }),
            Some(&f.admin_token),
        )
        .await;

    let res = f
        .app
        .get(
            &format!("/users/{}/activity-log?limit=2", f.viewer_id),
            Some(&f.admin_token),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let entries = res.body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "ROLE_ASSIGNED");
    assert_eq!(entries[1]["action"], "LOGIN");
    assert!(entries.iter().all(|e| e["orgId"] == "O1"));

    let outsider = f.app.seed_user("O2", "x@other.org", Role::Viewer).await;
    let denied = f
        .app
        .get(
            &format!("/users/{}/activity-log", outsider.id),
            Some(&f.admin_token),
        )
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn email_updates_respect_uniqueness() {
    let f = fixture().await;

    let res = f
        .app
        .put(
            &format!("/users/{}", f.viewer_id),
            json!({ "email": "ADMIN@demo.org" }),
            Some(&f.admin_token),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = f
        .app
        .put(
            &format!("/users/{}", f.viewer_id),
            json!({ "email": "vera@demo.org" }),
            Some(&f.admin_token),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["email"], "vera@demo.org");
}

#[tokio::test]
async fn check_email_reports_availability() {
    let f = fixture().await;
    let token = Some(f.admin_token.as_str());

    let taken = f.app.get("/users/check-email/Admin@demo.org", token).await;
    assert_eq!(taken.status, StatusCode::OK);
    assert_eq!(taken.body["email"], "admin@demo.org");
    assert_eq!(taken.body["available"], false);

    let free = f.app.get("/users/check-email/new@demo.org", token).await;
    assert_eq!(free.body["available"], true);

    let invalid = f.app.get("/users/check-email/not-an-email", token).await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn check_email_requires_authentication() {
    let f = fixture().await;

    let res = f.app.get("/users/check-email/viewer@demo.org", None).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(res.body.get("available").is_none());
}
