//! Refresh-token rotation and logout.

mod common;

use common::{login_alice, register_alice, test_app};
use identity_service::services::ServiceError;

#[tokio::test]
async fn rotation_invalidates_predecessor() {
    let app = test_app();
    register_alice(&app).await;

    let outcome = login_alice(&app).await;
    let r1 = outcome.refresh_token;

    let rotated = app.auth.refresh(&r1).await.expect("first rotation");
    let r2 = rotated.refresh_token;
    assert!(!rotated.access_token.is_empty());

    // r1 was consumed by the rotation and can never be redeemed again.
    let err = app.auth.refresh(&r1).await.unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));

    // r2 works exactly once more before its own rotation retires it.
    let rotated_again = app.auth.refresh(&r2).await.expect("second rotation");
    assert!(matches!(
        app.auth.refresh(&r2).await.unwrap_err(),
        ServiceError::Token(_)
    ));
    assert!(!rotated_again.refresh_token.is_empty());
}

#[tokio::test]
async fn access_token_is_not_accepted_for_refresh() {
    let app = test_app();
    register_alice(&app).await;

    let outcome = login_alice(&app).await;
    let err = app.auth.refresh(&outcome.access_token).await.unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let app = test_app();
    let err = app.auth.refresh("not-a-token").await.unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    let outcome = login_alice(&app).await;
    assert_eq!(app.store.active_refresh_count(snapshot.id), 1);

    // Identity comes from the refresh token itself, as it would when
    // the access token has already expired.
    app.auth.logout(None, &outcome.refresh_token).await;
    assert_eq!(app.store.active_refresh_count(snapshot.id), 0);

    // A second logout with the now-invalidated token is a quiet no-op.
    app.auth.logout(None, &outcome.refresh_token).await;

    // And the token cannot be used for rotation afterwards.
    let err = app.auth.refresh(&outcome.refresh_token).await.unwrap_err();
    assert!(matches!(err, ServiceError::Token(_)));
}

#[tokio::test]
async fn logout_with_garbage_refresh_token_does_not_panic() {
    let app = test_app();
    register_alice(&app).await;
    app.auth.logout(None, "garbage").await;
}

#[tokio::test]
async fn logout_scopes_to_the_presented_token() {
    let app = test_app();
    let snapshot = register_alice(&app).await;

    let first = login_alice(&app).await;
    let second = login_alice(&app).await;
    assert_eq!(app.store.active_refresh_count(snapshot.id), 2);

    app.auth.logout(None, &first.refresh_token).await;

    // The other session survives.
    assert_eq!(app.store.active_refresh_count(snapshot.id), 1);
    assert!(app.auth.refresh(&second.refresh_token).await.is_ok());
}
