//! Forgot/reset password flows and single-use token enforcement.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{login, login_alice, register_alice, test_app, test_app_with_provider, ALICE_EMAIL};
use identity_service::services::{EmailProvider, ServiceError};
use uuid::Uuid;

const NEW_PASSWORD: &str = "N3w!Password9";

#[tokio::test]
async fn reset_roundtrip_replaces_password() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.auth
        .forgot_password(ALICE_EMAIL, None)
        .await
        .expect("forgot password");

    let sent = app.email.last_reset_email().expect("reset email recorded");
    assert_eq!(sent.to, ALICE_EMAIL);
    assert_eq!(sent.user_id, snapshot.id);

    app.auth
        .reset_password(&sent.token, snapshot.id, NEW_PASSWORD)
        .await
        .expect("reset");

    // History grew; old password is rejected, new one works.
    assert_eq!(app.store.password_history_count(snapshot.id), 2);
    assert!(login(&app, ALICE_EMAIL, common::ALICE_PASSWORD).await.is_err());
    assert!(login(&app, ALICE_EMAIL, NEW_PASSWORD).await.is_ok());
}

#[tokio::test]
async fn reset_token_is_single_use() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.auth.forgot_password(ALICE_EMAIL, None).await.unwrap();
    let token = app.email.last_reset_email().unwrap().token;

    app.auth
        .reset_password(&token, snapshot.id, NEW_PASSWORD)
        .await
        .expect("first consume");

    let err = app
        .auth
        .reset_password(&token, snapshot.id, "An0ther!Pass2")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));
}

#[tokio::test]
async fn reissue_invalidates_prior_token() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.auth.forgot_password(ALICE_EMAIL, None).await.unwrap();
    let first = app.email.last_reset_email().unwrap().token;

    app.auth.forgot_password(ALICE_EMAIL, None).await.unwrap();
    let second = app.email.last_reset_email().unwrap().token;
    assert_ne!(first, second);

    // The earlier link died when the new one was issued, well before
    // its natural expiry.
    let err = app
        .auth
        .reset_password(&first, snapshot.id, NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));

    app.auth
        .reset_password(&second, snapshot.id, NEW_PASSWORD)
        .await
        .expect("latest token works");
}

#[tokio::test]
async fn weak_password_is_rejected_before_any_write() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.auth.forgot_password(ALICE_EMAIL, None).await.unwrap();
    let token = app.email.last_reset_email().unwrap().token;

    let err = app
        .auth
        .reset_password(&token, snapshot.id, "weak")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    // No history row was appended and the token is still redeemable.
    assert_eq!(app.store.password_history_count(snapshot.id), 1);
    app.auth
        .reset_password(&token, snapshot.id, NEW_PASSWORD)
        .await
        .expect("token survived the rejected attempt");
}

#[tokio::test]
async fn reset_deactivates_every_refresh_token() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    let session = login_alice(&app).await;
    assert_eq!(app.store.active_refresh_count(snapshot.id), 1);

    app.auth.forgot_password(ALICE_EMAIL, None).await.unwrap();
    let token = app.email.last_reset_email().unwrap().token;
    app.auth
        .reset_password(&token, snapshot.id, NEW_PASSWORD)
        .await
        .unwrap();

    // Full re-login is forced everywhere.
    assert_eq!(app.store.active_refresh_count(snapshot.id), 0);
    assert!(app.auth.refresh(&session.refresh_token).await.is_err());
}

#[tokio::test]
async fn unknown_contact_gets_the_same_acknowledgement() {
    let app = test_app();
    register_alice(&app).await;

    app.auth
        .forgot_password("stranger@example.com", None)
        .await
        .expect("silent success");
    assert_eq!(app.email.reset_email_count(), 0);
}

#[tokio::test]
async fn wrong_user_id_cannot_redeem_a_token() {
    let app = test_app();
    register_alice(&app).await;

    app.auth.forgot_password(ALICE_EMAIL, None).await.unwrap();
    let token = app.email.last_reset_email().unwrap().token;

    let err = app
        .auth
        .reset_password(&token, Uuid::new_v4(), NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));
}

struct FailingEmail;

#[async_trait]
impl EmailProvider for FailingEmail {
    async fn send_password_reset_email(
        &self,
        _to: &str,
        _token: &str,
        _user_id: Uuid,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        Err(ServiceError::Email("smtp unreachable".to_string()))
    }

    async fn send_setup_password_email(
        &self,
        _to: &str,
        _token: &str,
        _user_id: Uuid,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        Err(ServiceError::Email("smtp unreachable".to_string()))
    }
}

#[tokio::test]
async fn delivery_failure_is_swallowed() {
    let app = test_app_with_provider(Arc::new(FailingEmail));
    register_alice(&app).await;

    // The caller still gets a success-shaped outcome.
    app.auth
        .forgot_password(ALICE_EMAIL, None)
        .await
        .expect("delivery failure must not surface");
}
