//! Permission gate for protected routes.
//!
//! Routes declare what they need via a [`Requires`] extension layered
//! outside the gate; the gate itself checks the caller's cached
//! permission set. Wiring order matters: `auth_middleware` must run
//! first so [`CurrentUser`] is present.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Extension,
};

use crate::middleware::auth::CurrentUser;
use crate::services::rbac::{Permission, RequireLogic};
use crate::services::ServiceError;
use crate::AppState;

/// Permission requirements attached to a route.
#[derive(Debug, Clone)]
pub struct Requires {
    pub permissions: Vec<Permission>,
    pub logic: RequireLogic,
}

impl Requires {
    /// Caller must hold at least one of the permissions.
    pub fn any(permissions: Vec<Permission>) -> Self {
        Self {
            permissions,
            logic: RequireLogic::Any,
        }
    }

    /// Caller must hold every permission.
    pub fn all(permissions: Vec<Permission>) -> Self {
        Self {
            permissions,
            logic: RequireLogic::All,
        }
    }
}

/// Route-level gate. Checks through the permission cache rather than
/// the request-attached snapshot so a freshly invalidated identity is
/// re-resolved immediately.
pub async fn permission_gate(
    State(state): State<AppState>,
    Extension(requires): Extension<Requires>,
    req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .cloned()
        .ok_or(ServiceError::Unauthorized)?;

    let allowed = state
        .permissions
        .check(user.user_id, &requires.permissions, requires.logic)
        .await?;

    if !allowed {
        let wanted: Vec<String> = requires.permissions.iter().map(|p| p.to_string()).collect();
        tracing::warn!(
            user_id = %user.user_id,
            required = ?wanted,
            logic = ?requires.logic,
            "permission denied"
        );
        return Err(ServiceError::Forbidden(format!(
            "Required permission(s): {}",
            wanted.join(match requires.logic {
                RequireLogic::Any => " OR ",
                RequireLogic::All => " AND ",
            })
        )));
    }

    Ok(next.run(req).await)
}
