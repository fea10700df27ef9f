//! Shared setup for the integration suites: a fully wired auth service
//! over the in-memory store and a recording mail provider.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;

use identity_service::config::TokenConfig;
use identity_service::dtos::auth::{ContactInput, LoginRequest, RegisterRequest};
use identity_service::models::UserSnapshot;
use identity_service::services::{
    AuthService, EmailProvider, LoginOutcome, MemoryStore, MockEmailService, PermissionCache,
    RoleAggregator, ServiceError, SingleUseTokens, TokenCodec,
};
use identity_service::utils::password::{HashCost, PasswordPolicy};

pub const ALICE_PASSWORD: &str = "Str0ng!Pass1";
pub const ALICE_EMAIL: &str = "alice@example.com";

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub email: Arc<MockEmailService>,
    pub codec: TokenCodec,
    pub cache: Arc<PermissionCache>,
    pub auth: AuthService,
}

pub fn token_config() -> TokenConfig {
    TokenConfig {
        secret: "integration-test-secret-of-sufficient-length".to_string(),
        issuer: "task-platform".to_string(),
        audience: "task-platform-api".to_string(),
        access_ttl_minutes: 30,
        refresh_ttl_days: 7,
        reset_token_ttl_minutes: 60,
        setup_token_ttl_hours: 24,
    }
}

pub fn test_app() -> TestApp {
    test_app_with_email(Arc::new(MockEmailService::new()))
}

/// Build an app around a custom email provider (e.g. a failing one).
/// The returned `email` field only records when the default mock is in
/// use.
pub fn test_app_with_provider(provider: Arc<dyn EmailProvider>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let codec = TokenCodec::new(&token_config()).expect("codec");

    let aggregator = Arc::new(RoleAggregator::new(store.clone()));
    let cache = Arc::new(PermissionCache::new(aggregator, Duration::minutes(5)));

    let ledger = SingleUseTokens::new(store.clone(), Duration::minutes(60), Duration::hours(24));

    let auth = AuthService::new(
        store.clone(),
        codec.clone(),
        ledger,
        provider,
        cache.clone(),
        PasswordPolicy::default(),
        HashCost::default(),
        "http://localhost:3000".to_string(),
    );

    TestApp {
        store,
        email: Arc::new(MockEmailService::new()),
        codec,
        cache,
        auth,
    }
}

fn test_app_with_email(email: Arc<MockEmailService>) -> TestApp {
    let mut app = test_app_with_provider(email.clone());
    app.email = email;
    app
}

pub fn register_request(username: &str, email: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        password: ALICE_PASSWORD.to_string(),
        first_name: None,
        last_name: None,
        contacts: vec![ContactInput {
            contact_type: "email".to_string(),
            value: email.to_string(),
        }],
    }
}

pub async fn register_alice(app: &TestApp) -> UserSnapshot {
    app.auth
        .register(register_request("alice", ALICE_EMAIL))
        .await
        .expect("registration")
}

pub async fn login(
    app: &TestApp,
    contact: &str,
    password: &str,
) -> Result<LoginOutcome, ServiceError> {
    app.auth
        .login(LoginRequest {
            contact: contact.to_string(),
            password: password.to_string(),
            contact_type: None,
        })
        .await
}

pub async fn login_alice(app: &TestApp) -> LoginOutcome {
    login(app, ALICE_EMAIL, ALICE_PASSWORD).await.expect("login")
}
