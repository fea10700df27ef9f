//! Persisted token records: hashed refresh tokens and single-use
//! (reset / setup) tokens. Raw token values are never stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A refresh-token record. Only the SHA-256 hash of the token is kept;
/// the record is single-use for rotation and deleted when consumed.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(user_id: Uuid, token_hash: String, ttl_days: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            expires_at: now + Duration::days(ttl_days),
            is_active: true,
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_active && !self.is_expired()
    }
}

/// What a single-use token gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    PasswordReset,
    AccountSetup,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::AccountSetup => "account_setup",
        }
    }
}

impl std::str::FromStr for TokenPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password_reset" => Ok(TokenPurpose::PasswordReset),
            "account_setup" => Ok(TokenPurpose::AccountSetup),
            other => Err(format!("unknown token purpose: {other}")),
        }
    }
}

/// A single-use token record. Transitions unused -> used exactly once
/// and is then permanently inert; validity requires both "not expired"
/// and "not used".
#[derive(Debug, Clone)]
pub struct SingleUseTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl SingleUseTokenRecord {
    pub fn new(user_id: Uuid, token_hash: String, purpose: TokenPurpose, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            purpose,
            expires_at: now + ttl,
            is_used: false,
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_record_lifecycle() {
        let mut record = RefreshTokenRecord::new(Uuid::new_v4(), "hash".to_string(), 7);
        assert!(record.is_valid());

        record.is_active = false;
        assert!(!record.is_valid());

        record.is_active = true;
        record.expires_at = Utc::now() - Duration::seconds(1);
        assert!(record.is_expired());
        assert!(!record.is_valid());
    }

    #[test]
    fn single_use_token_expiry() {
        let mut record = SingleUseTokenRecord::new(
            Uuid::new_v4(),
            "hash".to_string(),
            TokenPurpose::PasswordReset,
            Duration::hours(1),
        );
        assert!(!record.is_expired());
        assert!(!record.is_used);

        record.expires_at = Utc::now() - Duration::seconds(1);
        assert!(record.is_expired());
    }

    #[test]
    fn purpose_roundtrips_through_str() {
        for purpose in [TokenPurpose::PasswordReset, TokenPurpose::AccountSetup] {
            assert_eq!(purpose.as_str().parse::<TokenPurpose>(), Ok(purpose));
        }
    }
}
