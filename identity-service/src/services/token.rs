//! Session token codec.
//!
//! Access and refresh tokens are authenticated-encrypted with
//! AES-256-GCM: the serialized claims are sealed under a random nonce
//! and the result is transported as `base64url(nonce || ciphertext)`.
//! One primitive provides both confidentiality and integrity, so token
//! contents are opaque to clients and any tampering fails decryption.
//!
//! The two token kinds share the codec but are mutually
//! non-substitutable via the `type` claim.

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::TokenConfig;
use crate::services::ServiceError;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

/// Discriminates access from refresh tokens; checked on every verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried inside a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Why verification failed. Logged internally; every kind renders as
/// the same generic message externally to avoid an oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorKind {
    Malformed,
    Decrypt,
    Expired,
    IssuerMismatch,
    AudienceMismatch,
    InvalidTokenType,
    Used,
    NotFound,
}

#[derive(Debug, Clone, Error)]
#[error("invalid or expired token")]
pub struct TokenError {
    kind: TokenErrorKind,
}

impl TokenError {
    pub fn new(kind: TokenErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> TokenErrorKind {
        self.kind
    }
}

/// Codec for issuing and verifying session tokens.
#[derive(Clone)]
pub struct TokenCodec {
    key: Zeroizing<[u8; KEY_LENGTH]>,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Build the codec from configuration. The encryption key must be
    /// exactly [`KEY_LENGTH`] bytes: a longer secret is stretched down
    /// with SHA-256, a shorter one is rejected so the process refuses
    /// to start on weak key material.
    pub fn new(config: &TokenConfig) -> Result<Self, ServiceError> {
        let secret = config.secret.as_bytes();
        if secret.len() < KEY_LENGTH {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "token secret must be at least {} bytes, got {}",
                KEY_LENGTH,
                secret.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
        if secret.len() == KEY_LENGTH {
            key.copy_from_slice(secret);
        } else {
            let digest = Sha256::digest(secret);
            key.copy_from_slice(&digest);
        }

        Ok(Self {
            key,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_ttl_days),
        })
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_ttl_days(&self) -> i64 {
        self.refresh_ttl.num_days()
    }

    /// Issue an access token carrying identity, username and role names.
    pub fn issue_access(
        &self,
        user_id: Uuid,
        username: &str,
        roles: Vec<String>,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        self.seal(&SessionClaims {
            sub: user_id,
            username: Some(username.to_string()),
            roles,
            token_type: TokenType::Access,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        })
    }

    /// Issue a refresh token. Carries the subject only.
    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, ServiceError> {
        let now = Utc::now();
        self.seal(&SessionClaims {
            sub: user_id,
            username: None,
            roles: Vec::new(),
            token_type: TokenType::Refresh,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        })
    }

    /// Decrypt and validate a token, requiring the expected type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<SessionClaims, TokenError> {
        let claims = self.open(token)?;

        if claims.exp < Utc::now().timestamp() {
            return Err(self.reject(TokenErrorKind::Expired));
        }
        if claims.iss != self.issuer {
            return Err(self.reject(TokenErrorKind::IssuerMismatch));
        }
        if claims.aud != self.audience {
            return Err(self.reject(TokenErrorKind::AudienceMismatch));
        }
        if claims.token_type != expected {
            return Err(self.reject(TokenErrorKind::InvalidTokenType));
        }

        Ok(claims)
    }

    fn seal(&self, claims: &SessionClaims) -> Result<String, ServiceError> {
        let plaintext = serde_json::to_vec(claims)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("claims encode failed: {e}")))?;

        let cipher = Aes256Gcm::new_from_slice(self.key.as_ref())
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("invalid token key length")))?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("token encryption failed")))?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.append(&mut ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn open(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| self.reject(TokenErrorKind::Malformed))?;
        if sealed.len() <= NONCE_LENGTH {
            return Err(self.reject(TokenErrorKind::Malformed));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
        let cipher = Aes256Gcm::new_from_slice(self.key.as_ref())
            .map_err(|_| self.reject(TokenErrorKind::Decrypt))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| self.reject(TokenErrorKind::Decrypt))?;

        serde_json::from_slice(&plaintext).map_err(|_| self.reject(TokenErrorKind::Malformed))
    }

    fn reject(&self, kind: TokenErrorKind) -> TokenError {
        tracing::debug!(reason = ?kind, "token rejected");
        TokenError::new(kind)
    }
}

/// Deterministic one-way hash for opaque-token storage. Deterministic
/// (unlike the salted password hash) because the raw token must be
/// re-hashed on lookup.
pub fn hash_opaque_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

/// Constant-time equality over stored token hashes.
pub fn opaque_hashes_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Generate a high-entropy opaque token (32 random bytes, hex-encoded).
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "an-adequately-long-test-secret-value".to_string(),
            issuer: "task-platform".to_string(),
            audience: "task-platform-api".to_string(),
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
            reset_token_ttl_minutes: 60,
            setup_token_ttl_hours: 24,
        }
    }

    #[test]
    fn rejects_short_secret_at_construction() {
        let mut config = test_config();
        config.secret = "too-short".to_string();
        assert!(TokenCodec::new(&config).is_err());
    }

    #[test]
    fn exact_length_secret_is_used_directly() {
        let mut config = test_config();
        config.secret = "0123456789abcdef0123456789abcdef".to_string();
        assert!(TokenCodec::new(&config).is_ok());
    }

    #[test]
    fn access_token_roundtrip() {
        let codec = TokenCodec::new(&test_config()).unwrap();
        let user_id = Uuid::new_v4();

        let token = codec
            .issue_access(user_id, "alice", vec!["user".to_string()])
            .unwrap();
        assert!(!token.is_empty());

        let claims = codec.verify(&token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.roles, vec!["user".to_string()]);
    }

    #[test]
    fn token_types_are_not_substitutable() {
        let codec = TokenCodec::new(&test_config()).unwrap();
        let user_id = Uuid::new_v4();

        let access = codec.issue_access(user_id, "alice", vec![]).unwrap();
        let refresh = codec.issue_refresh(user_id).unwrap();

        let err = codec.verify(&access, TokenType::Refresh).unwrap_err();
        assert_eq!(err.kind(), TokenErrorKind::InvalidTokenType);
        let err = codec.verify(&refresh, TokenType::Access).unwrap_err();
        assert_eq!(err.kind(), TokenErrorKind::InvalidTokenType);
    }

    #[test]
    fn tampered_token_fails_decryption() {
        let codec = TokenCodec::new(&test_config()).unwrap();
        let token = codec.issue_refresh(Uuid::new_v4()).unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(token.as_bytes()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(bytes);

        let err = codec.verify(&tampered, TokenType::Refresh).unwrap_err();
        assert_eq!(err.kind(), TokenErrorKind::Decrypt);
    }

    #[test]
    fn foreign_key_cannot_open_token() {
        let codec_a = TokenCodec::new(&test_config()).unwrap();
        let mut other = test_config();
        other.secret = "a-completely-different-secret-material!".to_string();
        let codec_b = TokenCodec::new(&other).unwrap();

        let token = codec_a.issue_refresh(Uuid::new_v4()).unwrap();
        assert!(codec_b.verify(&token, TokenType::Refresh).is_err());
    }

    #[test]
    fn opaque_hash_is_deterministic() {
        let raw = generate_opaque_token();
        assert_eq!(hash_opaque_token(&raw), hash_opaque_token(&raw));
        assert!(opaque_hashes_match(
            &hash_opaque_token(&raw),
            &hash_opaque_token(&raw)
        ));
        assert!(!opaque_hashes_match(
            &hash_opaque_token(&raw),
            &hash_opaque_token("other")
        ));
    }
}
