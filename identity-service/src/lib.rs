pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::AppConfig;
use crate::middleware::{auth_middleware, permission_gate, Requires};
use crate::services::rbac::{Action, Permission, PermissionCache};
use crate::services::{AuthService, AuthStore, EmailProvider, ServiceError, TokenCodec};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::refresh,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::change_password,
        handlers::auth::setup_password,
        handlers::auth::verify_contact,
        handlers::auth::me,
        handlers::auth::user_permissions,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::ContactInput,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::LogoutRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::ForgotPasswordRequest,
            dtos::auth::ResetPasswordRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::SetupPasswordRequest,
            dtos::auth::VerifyContactRequest,
            dtos::auth::MessageResponse,
            dtos::auth::MeResponse,
            dtos::auth::UserPermissionsResponse,
            models::user::UserSnapshot,
            models::contact::ContactView,
            models::contact::ContactKind,
            models::role::RoleInfo,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, sessions and token rotation"),
        (name = "Password", description = "Password lifecycle"),
        (name = "Authorization", description = "Permission introspection"),
        (name = "Observability", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cookie_auth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                    middleware::ACCESS_TOKEN_COOKIE,
                ))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn AuthStore>,
    pub codec: TokenCodec,
    pub email: Arc<dyn EmailProvider>,
    pub permissions: Arc<PermissionCache>,
    pub auth: AuthService,
}

pub fn build_router(state: AppState) -> Router {
    // Permission introspection is gated on users:read.
    let authz_routes = Router::new()
        .route(
            "/auth/users/:user_id/permissions",
            get(handlers::auth::user_permissions),
        )
        .route_layer(from_fn_with_state(state.clone(), permission_gate))
        .route_layer(Extension(Requires::any(vec![Permission::new(
            "users",
            Action::Read,
        )])))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let authenticated_routes = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/auth/password/change",
            post(handlers::auth::change_password),
        )
        .route(
            "/auth/contacts/verify",
            post(handlers::auth::verify_contact),
        )
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::error!(origin = %origin, error = %e, "invalid CORS origin, skipping");
                        None
                    }
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(<ApiDoc as OpenApi>::openapi()) }),
        )
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/auth/password/forgot",
            post(handlers::auth::forgot_password),
        )
        .route("/auth/password/reset", post(handlers::auth::reset_password))
        .route("/auth/password/setup", post(handlers::auth::setup_password))
        .merge(authenticated_routes)
        .merge(authz_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(cors)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
