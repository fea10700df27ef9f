//! Single-use token ledger.
//!
//! Issues and validates one-time tokens for password reset and
//! first-time account setup. Only the hash of a token is stored.
//! Issuing a new token invalidates every prior unused token of the
//! same purpose, so at most one live link exists per user. The
//! unused -> used flip itself happens inside the store's atomic
//! `replace_password`, in the same transaction as the password write
//! the token gates.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::models::{SingleUseTokenRecord, TokenPurpose};
use crate::services::store::AuthStore;
use crate::services::token::{
    generate_opaque_token, hash_opaque_token, TokenError, TokenErrorKind,
};
use crate::services::ServiceError;

#[derive(Clone)]
pub struct SingleUseTokens {
    store: Arc<dyn AuthStore>,
    reset_ttl: Duration,
    setup_ttl: Duration,
}

impl SingleUseTokens {
    pub fn new(store: Arc<dyn AuthStore>, reset_ttl: Duration, setup_ttl: Duration) -> Self {
        Self {
            store,
            reset_ttl,
            setup_ttl,
        }
    }

    fn ttl_for(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::PasswordReset => self.reset_ttl,
            TokenPurpose::AccountSetup => self.setup_ttl,
        }
    }

    /// Issue a fresh token, invalidating prior unused tokens of the
    /// same purpose first. Returns the raw value for delivery; only
    /// its hash is persisted.
    pub async fn issue(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<String, ServiceError> {
        self.store
            .invalidate_single_use_tokens(user_id, purpose)
            .await?;

        let raw = generate_opaque_token();
        let record = SingleUseTokenRecord::new(
            user_id,
            hash_opaque_token(&raw),
            purpose,
            self.ttl_for(purpose),
        );
        self.store.create_single_use_token(record).await?;

        tracing::info!(user_id = %user_id, purpose = purpose.as_str(), "single-use token issued");
        Ok(raw)
    }

    /// Validate a presented token for the user and purpose. Unknown,
    /// already-used and expired tokens are distinguished internally
    /// (and in logs) but all surface as the same generic token error.
    /// The caller marks the returned record used via the gated write.
    pub async fn validate(
        &self,
        user_id: Uuid,
        raw_token: &str,
        purpose: TokenPurpose,
    ) -> Result<SingleUseTokenRecord, ServiceError> {
        let record = self
            .store
            .find_single_use_token(user_id, &hash_opaque_token(raw_token), purpose)
            .await?
            .ok_or_else(|| {
                tracing::debug!(user_id = %user_id, "single-use token not found");
                ServiceError::Token(TokenError::new(TokenErrorKind::NotFound))
            })?;

        if record.is_used {
            tracing::debug!(user_id = %user_id, token_id = %record.id, "single-use token already used");
            return Err(ServiceError::Token(TokenError::new(TokenErrorKind::Used)));
        }
        if record.is_expired() {
            tracing::debug!(user_id = %user_id, token_id = %record.id, "single-use token expired");
            return Err(ServiceError::Token(TokenError::new(
                TokenErrorKind::Expired,
            )));
        }

        Ok(record)
    }
}
