//! Auth endpoints.
//!
//! Session tokens travel as two http-only, same-site-strict cookies
//! with independent lifetimes; response bodies never carry the raw
//! token values.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

use crate::dtos::auth::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, LogoutRequest,
    MeResponse, MessageResponse, RefreshRequest, RegisterRequest, RegisterResponse,
    ResetPasswordRequest, SetupPasswordRequest, UserPermissionsResponse, VerifyContactRequest,
};
use crate::middleware::{AuthUser, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::services::token::{TokenError, TokenErrorKind, TokenType};
use crate::services::ServiceError;
use crate::utils::ValidatedJson;
use crate::AppState;

fn session_cookie(name: &'static str, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(max_age)
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").build();
    cookie.make_removal();
    cookie
}

fn set_session_cookies(
    jar: CookieJar,
    state: &AppState,
    access_token: String,
    refresh_token: String,
) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        access_token,
        time::Duration::minutes(state.config.token.access_ttl_minutes),
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        refresh_token,
        time::Duration::days(state.config.token.refresh_ttl_days),
    ))
}

fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.add(expired_cookie(ACCESS_TOKEN_COOKIE))
        .add(expired_cookie(REFRESH_TOKEN_COOKIE))
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 409, description = "Username or contact already taken", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.auth.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user,
        }),
    ))
}

/// Login with a primary contact and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account inactive", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.auth.login(req).await?;
    let jar = set_session_cookies(jar, &state, outcome.access_token, outcome.refresh_token);
    Ok((
        jar,
        Json(LoginResponse {
            user: outcome.user,
            permissions: outcome.permissions,
        }),
    ))
}

/// Logout and invalidate the refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    jar: CookieJar,
    body: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    // Logout must succeed even with an expired access token; the
    // refresh token alone is enough to recover the identity.
    let claims = crate::middleware::auth::extract_access_token(&headers, &jar)
        .and_then(|token| state.codec.verify(&token, TokenType::Access).ok());

    let refresh_token = body
        .and_then(|Json(req)| req.refresh_token)
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()));

    if let Some(refresh_token) = refresh_token {
        state.auth.logout(claims, &refresh_token).await;
    }

    let jar = clear_session_cookies(jar);
    (
        jar,
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    )
}

/// Rotate the session token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = MessageResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let refresh_token = body
        .and_then(|Json(req)| req.refresh_token)
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| ServiceError::Token(TokenError::new(TokenErrorKind::NotFound)))?;

    let outcome = state.auth.refresh(&refresh_token).await?;
    let jar = set_session_cookies(jar, &state, outcome.access_token, outcome.refresh_token);
    Ok((
        jar,
        Json(MessageResponse {
            message: "Tokens refreshed successfully".to_string(),
        }),
    ))
}

/// Request a password-reset link
#[utoipa::path(
    post,
    path = "/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Acknowledged", body = MessageResponse)
    ),
    tag = "Password"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .auth
        .forgot_password(&req.contact, req.contact_type.as_deref())
        .await?;

    // Identical acknowledgement whether or not the contact exists.
    Ok(Json(MessageResponse {
        message: "If the contact exists, a password reset link will be sent".to_string(),
    }))
}

/// Redeem a reset token and set a new password
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .auth
        .reset_password(&req.token, req.user_id, &req.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password reset successfully".to_string(),
    }))
}

/// Change the password of the authenticated user
#[utoipa::path(
    post,
    path = "/auth/password/change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Current password incorrect", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Password",
    security(("cookie_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .auth
        .change_password(user.user_id, &req.old_password, &req.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}

/// First-time password setup via an account-setup token
#[utoipa::path(
    post,
    path = "/auth/password/setup",
    request_body = SetupPasswordRequest,
    responses(
        (status = 200, description = "Password set and account verified", body = MessageResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn setup_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SetupPasswordRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .auth
        .setup_password(&req.token, req.user_id, &req.password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password set successfully. Your account is now verified.".to_string(),
    }))
}

/// Verify a contact belonging to the authenticated user
#[utoipa::path(
    post,
    path = "/auth/contacts/verify",
    request_body = VerifyContactRequest,
    responses(
        (status = 200, description = "Contact verified", body = MessageResponse),
        (status = 404, description = "Contact not found", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("cookie_auth" = []))
)]
pub async fn verify_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<VerifyContactRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .auth
        .verify_contact(user.user_id, req.contact_id, &req.code)
        .await?;
    Ok(Json(MessageResponse {
        message: "Contact verified successfully".to_string(),
    }))
}

/// The authenticated user with roles, contacts and permissions
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("cookie_auth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let (snapshot, permissions) = state.auth.current_user(user.user_id).await?;
    Ok(Json(MeResponse {
        user: snapshot,
        permissions,
    }))
}

/// Effective permissions of any user (requires `users:read`)
#[utoipa::path(
    get,
    path = "/auth/users/{user_id}/permissions",
    params(("user_id" = Uuid, Path, description = "User to inspect")),
    responses(
        (status = 200, description = "Resolved permissions", body = UserPermissionsResponse),
        (status = 403, description = "Missing permission", body = ErrorResponse)
    ),
    tag = "Authorization",
    security(("cookie_auth" = []))
)]
pub async fn user_permissions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let resolved = state.permissions.get(user_id).await?;
    Ok(Json(UserPermissionsResponse {
        user_id,
        roles: resolved.roles,
        permissions: resolved.permissions.as_strings(),
    }))
}
