//! Persistence boundary.
//!
//! The auth core consumes storage through [`AuthStore`]; the
//! multi-write operations (`create_user`, `replace_password`,
//! `delete_refresh_record`) are atomic in every implementation so each
//! orchestrator call has a single commit point and no partial writes.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    ContactKind, PermissionRow, RefreshTokenRecord, Role, SingleUseTokenRecord, TokenPurpose,
    User, UserContact,
};
use crate::services::ServiceError;

/// A contact supplied at registration.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub kind: ContactKind,
    pub value: String,
    pub is_primary: bool,
}

/// Everything needed to create an account in one transaction.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contacts: Vec<NewContact>,
    /// Role assigned at creation (one role at a time by business rule,
    /// even though the schema allows many).
    pub default_role: Option<String>,
}

/// Atomic password replacement: update the credential pointer, append
/// the history row, optionally consume the gating single-use token and
/// flip the verified flag, and deactivate every refresh record.
#[derive(Debug, Clone, Default)]
pub struct PasswordReplacement {
    pub new_hash: String,
    pub consume_token: Option<Uuid>,
    pub mark_verified: bool,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    // ==================== Identities ====================

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError>;

    /// Locate a user through an active *primary* contact of the given
    /// kind. Secondary contacts never resolve an identity.
    async fn find_user_by_primary_contact(
        &self,
        value: &str,
        kind: ContactKind,
    ) -> Result<Option<User>, ServiceError>;

    /// Create user + contacts + first password-history row + default
    /// role assignment atomically. Fails with `Conflict` on duplicate
    /// username or contact value, rolling back everything.
    async fn create_user(&self, new_user: NewUser) -> Result<User, ServiceError>;

    async fn contacts_for_user(&self, user_id: Uuid) -> Result<Vec<UserContact>, ServiceError>;

    async fn find_contact_for_user(
        &self,
        user_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<UserContact>, ServiceError>;

    // ==================== Credentials ====================

    /// Hash of the most recent password-history row, if any.
    async fn latest_password_hash(&self, user_id: Uuid) -> Result<Option<String>, ServiceError>;

    async fn replace_password(
        &self,
        user_id: Uuid,
        replacement: PasswordReplacement,
    ) -> Result<(), ServiceError>;

    // ==================== Roles & permissions ====================

    /// Active, non-deleted roles currently assigned through active
    /// assignments.
    async fn active_roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, ServiceError>;

    /// Active, non-deleted permissions granted to the given roles.
    /// Duplicates across roles are returned as-is; the aggregator
    /// deduplicates.
    async fn active_permissions_for_roles(
        &self,
        role_ids: &[Uuid],
    ) -> Result<Vec<PermissionRow>, ServiceError>;

    // ==================== Refresh records ====================

    async fn create_refresh_record(&self, record: RefreshTokenRecord)
        -> Result<(), ServiceError>;

    async fn find_active_refresh_record(
        &self,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError>;

    /// Strictly-once delete: returns whether this call removed the
    /// record. Of two racers presenting the same token, exactly one
    /// observes `true`.
    async fn delete_refresh_record(&self, id: Uuid) -> Result<bool, ServiceError>;

    /// Deactivate every active refresh record for a user (password
    /// change/reset/setup force a full re-login everywhere).
    async fn deactivate_refresh_records(&self, user_id: Uuid) -> Result<(), ServiceError>;

    // ==================== Single-use tokens ====================

    async fn create_single_use_token(
        &self,
        record: SingleUseTokenRecord,
    ) -> Result<(), ServiceError>;

    /// Look up a single-use token by hash for the given user and
    /// purpose, including used ones so callers can distinguish
    /// "already used" from "never existed".
    async fn find_single_use_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SingleUseTokenRecord>, ServiceError>;

    /// Mark every unused token of the purpose as used
    /// (invalidate-on-reissue).
    async fn invalidate_single_use_tokens(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<(), ServiceError>;
}
