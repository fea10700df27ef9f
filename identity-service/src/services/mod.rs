pub mod auth;
pub mod email;
pub mod error;
pub mod ledger;
pub mod rbac;
pub mod store;
pub mod token;

pub use auth::{AuthService, LoginOutcome, RefreshOutcome, DEFAULT_ROLE};
pub use email::{EmailProvider, MockEmailService, SmtpEmailService};
pub use error::ServiceError;
pub use ledger::SingleUseTokens;
pub use rbac::{
    Action, Permission, PermissionCache, PermissionSet, PermissionSource, RequireLogic,
    ResolvedPermissions, RoleAggregator,
};
pub use store::{AuthStore, MemoryStore, NewContact, NewUser, PasswordReplacement, PgStore};
pub use token::{hash_opaque_token, SessionClaims, TokenCodec, TokenError, TokenType};
