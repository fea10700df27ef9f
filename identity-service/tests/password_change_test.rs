//! Authenticated password change and first-time setup.

mod common;

use common::{login, login_alice, register_alice, test_app, ALICE_EMAIL, ALICE_PASSWORD};
use identity_service::services::{AuthStore, ServiceError};

const NEW_PASSWORD: &str = "N3w!Password9";

#[tokio::test]
async fn change_password_roundtrip() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.auth
        .change_password(snapshot.id, ALICE_PASSWORD, NEW_PASSWORD)
        .await
        .expect("change");

    assert_eq!(app.store.password_history_count(snapshot.id), 2);
    assert!(login(&app, ALICE_EMAIL, ALICE_PASSWORD).await.is_err());
    assert!(login(&app, ALICE_EMAIL, NEW_PASSWORD).await.is_ok());
}

#[tokio::test]
async fn change_rejects_wrong_current_password() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    let err = app
        .auth
        .change_password(snapshot.id, "Wr0ng!Pass1", NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Credential));
    assert_eq!(app.store.password_history_count(snapshot.id), 1);
}

#[tokio::test]
async fn change_rejects_reusing_the_current_password() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    // Same literal string as the current password: a validation-style
    // rejection, not a silent success.
    let err = app
        .auth
        .change_password(snapshot.id, ALICE_PASSWORD, ALICE_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(app.store.password_history_count(snapshot.id), 1);
}

#[tokio::test]
async fn change_rejects_weak_password_without_write() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    let err = app
        .auth
        .change_password(snapshot.id, ALICE_PASSWORD, "weak")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(app.store.password_history_count(snapshot.id), 1);
}

#[tokio::test]
async fn change_deactivates_refresh_tokens() {
    let app = test_app();
    let snapshot = register_alice(&app).await;
    let session = login_alice(&app).await;

    app.auth
        .change_password(snapshot.id, ALICE_PASSWORD, NEW_PASSWORD)
        .await
        .unwrap();

    assert_eq!(app.store.active_refresh_count(snapshot.id), 0);
    assert!(app.auth.refresh(&session.refresh_token).await.is_err());
}

#[tokio::test]
async fn setup_password_verifies_the_account() {
    let app = test_app();
    let snapshot = register_alice(&app).await;
    assert!(!snapshot.is_verified);

    app.auth
        .issue_setup_token(snapshot.id)
        .await
        .expect("setup token issuance");
    let sent = app.email.last_setup_email().expect("setup email recorded");
    assert_eq!(sent.to, ALICE_EMAIL);

    app.auth
        .setup_password(&sent.token, snapshot.id, NEW_PASSWORD)
        .await
        .expect("setup");

    let user = app
        .store
        .find_user_by_id(snapshot.id)
        .await
        .unwrap()
        .expect("user");
    assert!(user.is_verified);
    assert_eq!(app.store.password_history_count(snapshot.id), 2);
    assert!(login(&app, ALICE_EMAIL, NEW_PASSWORD).await.is_ok());
}

#[tokio::test]
async fn setup_token_is_single_use() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.auth.issue_setup_token(snapshot.id).await.unwrap();
    let token = app.email.last_setup_email().unwrap().token;

    app.auth
        .setup_password(&token, snapshot.id, NEW_PASSWORD)
        .await
        .expect("first use");

    let err = app
        .auth
        .setup_password(&token, snapshot.id, "An0ther!Pass2")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));
}

#[tokio::test]
async fn setup_rejects_weak_password() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.auth.issue_setup_token(snapshot.id).await.unwrap();
    let token = app.email.last_setup_email().unwrap().token;

    let err = app
        .auth
        .setup_password(&token, snapshot.id, "weak")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(app.store.password_history_count(snapshot.id), 1);
}

#[tokio::test]
async fn reset_and_setup_tokens_are_not_interchangeable() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    app.auth.issue_setup_token(snapshot.id).await.unwrap();
    let setup_token = app.email.last_setup_email().unwrap().token;

    // A setup token presented on the reset path has the wrong purpose.
    let err = app
        .auth
        .reset_password(&setup_token, snapshot.id, NEW_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));
}
