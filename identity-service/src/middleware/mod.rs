pub mod auth;
pub mod rbac;

pub use auth::{auth_middleware, AuthUser, CurrentUser, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
pub use rbac::{permission_gate, Requires};
