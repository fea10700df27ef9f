//! Request authentication.
//!
//! Accepts the access token from the `access_token` cookie or a
//! `Bearer` Authorization header, verifies it through the codec, loads
//! the caller's permissions through the cache and parks a
//! [`CurrentUser`] in the request extensions for handlers and the
//! permission gate.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::dtos::ErrorResponse;
use crate::models::RoleInfo;
use crate::services::rbac::PermissionSet;
use crate::services::token::TokenType;
use crate::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// The authenticated caller, with permissions already resolved.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub roles: Vec<RoleInfo>,
    pub permissions: PermissionSet,
}

/// Pull the access token from the cookie or the Authorization header.
pub fn extract_access_token(parts_headers: &axum::http::HeaderMap, jar: &CookieJar) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    parts_headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Middleware guarding authenticated routes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let jar = CookieJar::from_headers(req.headers());

    let token = extract_access_token(req.headers(), &jar).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Authentication required".to_string(),
                details: None,
            }),
        )
    })?;

    let claims = state
        .codec
        .verify(&token, TokenType::Access)
        .map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or expired token".to_string(),
                    details: None,
                }),
            )
        })?;

    let resolved = state.permissions.get(claims.sub).await.map_err(|e| {
        tracing::error!(error = %e, "permission resolution failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Internal server error".to_string(),
                details: None,
            }),
        )
    })?;

    req.extensions_mut().insert(CurrentUser {
        user_id: claims.sub,
        username: claims.username,
        roles: resolved.roles,
        permissions: resolved.permissions,
    });

    Ok(next.run(req).await)
}

/// Extractor for handlers behind [`auth_middleware`].
pub struct AuthUser(pub CurrentUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<CurrentUser>().cloned().ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Auth context missing from request extensions".to_string(),
                    details: None,
                }),
            )
                .into_response()
        })?;

        Ok(AuthUser(user))
    }
}
