use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{RoleInfo, UserSnapshot};

/// A contact supplied at registration. Format is validated against the
/// declared type by the service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactInput {
    #[schema(example = "email")]
    pub contact_type: String,
    #[schema(example = "alice@example.com")]
    pub value: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 100, message = "Username must be 3-100 characters"))]
    #[schema(example = "alice")]
    pub username: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "Str0ng!Pass1", min_length = 8)]
    pub password: String,

    #[validate(length(max = 100, message = "First name must not exceed 100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 100, message = "Last name must not exceed 100 characters"))]
    pub last_name: Option<String>,

    #[validate(length(min = 1, message = "At least one contact is required"))]
    pub contacts: Vec<ContactInput>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    #[schema(example = "User registered successfully")]
    pub message: String,
    pub user: UserSnapshot,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Contact is required"))]
    #[schema(example = "alice@example.com")]
    pub contact: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Str0ng!Pass1")]
    pub password: String,

    /// Optional explicit contact type; inferred from the value shape
    /// when omitted.
    #[schema(example = "email")]
    pub contact_type: Option<String>,
}

/// Login result body. The access and refresh tokens themselves travel
/// out-of-band as http-only cookies.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user: UserSnapshot,
    /// Wire-form permission strings, e.g. `tasks:read`.
    pub permissions: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LogoutRequest {
    /// Falls back to the refresh-token cookie when absent.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// Falls back to the refresh-token cookie when absent.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(length(min = 1, message = "Contact is required"))]
    #[schema(example = "alice@example.com")]
    pub contact: String,

    pub contact_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    pub user_id: Uuid,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub old_password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetupPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    pub user_id: Uuid,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyContactRequest {
    pub contact_id: Uuid,

    #[validate(length(min = 1, message = "Verification code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserSnapshot,
    pub permissions: Vec<String>,
}

/// Effective-permission introspection for one user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserPermissionsResponse {
    pub user_id: Uuid,
    pub roles: Vec<RoleInfo>,
    pub permissions: Vec<String>,
}
