pub mod contact;
pub mod role;
pub mod token;
pub mod user;

pub use contact::{ContactKind, ContactView, UserContact};
pub use role::{PermissionRow, Role, RoleInfo};
pub use token::{RefreshTokenRecord, SingleUseTokenRecord, TokenPurpose};
pub use user::{User, UserSnapshot};
