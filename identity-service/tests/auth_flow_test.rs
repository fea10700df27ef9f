//! Registration and login flows.

mod common;

use common::{login, login_alice, register_alice, register_request, test_app, ALICE_EMAIL};
use identity_service::dtos::auth::{ContactInput, LoginRequest};
use identity_service::services::{AuthStore, ServiceError, TokenType};

#[tokio::test]
async fn full_login_roundtrip() {
    let app = test_app();

    let snapshot = register_alice(&app).await;
    assert_eq!(snapshot.username, "alice");
    assert!(snapshot.is_active);
    assert!(!snapshot.is_verified);
    assert_eq!(snapshot.roles.len(), 1);
    assert_eq!(snapshot.roles[0].name, "user");
    assert!(snapshot.contacts.iter().any(|c| c.value == ALICE_EMAIL && c.is_primary));

    let outcome = login_alice(&app).await;
    assert!(!outcome.access_token.is_empty());
    assert!(!outcome.refresh_token.is_empty());

    // The default role's read permissions come back with the login.
    assert!(outcome.permissions.contains(&"tasks:read".to_string()));
    assert!(outcome.permissions.contains(&"projects:read".to_string()));

    // The access token decrypts to the right identity and roles.
    let claims = app
        .codec
        .verify(&outcome.access_token, TokenType::Access)
        .expect("access claims");
    assert_eq!(claims.sub, snapshot.id);
    assert_eq!(claims.username.as_deref(), Some("alice"));
    assert_eq!(claims.roles, vec!["user".to_string()]);
}

#[tokio::test]
async fn registration_is_not_auto_login() {
    let app = test_app();
    register_alice(&app).await;
    // No refresh record exists until an actual login.
    let snapshot = app
        .store
        .find_user_by_username("alice")
        .await
        .unwrap()
        .expect("user exists");
    assert_eq!(app.store.active_refresh_count(snapshot.id), 0);
}

#[tokio::test]
async fn register_rejects_weak_password_without_creating_user() {
    let app = test_app();

    let mut req = register_request("alice", ALICE_EMAIL);
    req.password = "weak".to_string();
    let err = app.auth.register(req).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert!(app
        .store
        .find_user_by_username("alice")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn register_rejects_duplicate_username() {
    let app = test_app();
    register_alice(&app).await;

    let err = app
        .auth
        .register(register_request("alice", "other@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn register_rejects_duplicate_contact() {
    let app = test_app();
    register_alice(&app).await;

    let err = app
        .auth
        .register(register_request("bob", ALICE_EMAIL))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn register_requires_an_email_contact() {
    let app = test_app();

    let mut req = register_request("alice", ALICE_EMAIL);
    req.contacts = vec![ContactInput {
        contact_type: "mobile".to_string(),
        value: "+14155552671".to_string(),
    }];
    let err = app.auth.register(req).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn register_rejects_malformed_contact() {
    let app = test_app();

    let mut req = register_request("alice", "not-an-email");
    req.contacts[0].value = "not-an-email".to_string();
    let err = app.auth.register(req).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn login_failures_are_uniform() {
    let app = test_app();
    register_alice(&app).await;

    // Unknown contact and wrong password produce the same error class.
    let unknown = login(&app, "nobody@example.com", "Str0ng!Pass1")
        .await
        .unwrap_err();
    let wrong = login(&app, ALICE_EMAIL, "Wr0ng!Pass1").await.unwrap_err();
    assert!(matches!(unknown, ServiceError::Credential));
    assert!(matches!(wrong, ServiceError::Credential));
}

#[tokio::test]
async fn login_rejects_inactive_account() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.store.set_active(snapshot.id, false);
    let err = login(&app, ALICE_EMAIL, common::ALICE_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::State(_)));
}

#[tokio::test]
async fn login_accepts_explicit_contact_type() {
    let app = test_app();
    register_alice(&app).await;

    let outcome = app
        .auth
        .login(LoginRequest {
            contact: ALICE_EMAIL.to_string(),
            password: common::ALICE_PASSWORD.to_string(),
            contact_type: Some("email".to_string()),
        })
        .await
        .expect("login");
    assert!(!outcome.access_token.is_empty());
}

#[tokio::test]
async fn login_rejects_undetectable_contact() {
    let app = test_app();
    register_alice(&app).await;

    let err = login(&app, "???", common::ALICE_PASSWORD).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn secondary_contact_cannot_login() {
    let app = test_app();

    let mut req = register_request("alice", ALICE_EMAIL);
    req.contacts.push(ContactInput {
        contact_type: "email".to_string(),
        value: "alice.backup@example.com".to_string(),
    });
    app.auth.register(req).await.expect("registration");

    // The second email contact is non-primary and must not resolve.
    let err = login(&app, "alice.backup@example.com", common::ALICE_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Credential));
}
