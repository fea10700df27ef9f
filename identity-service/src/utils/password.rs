//! Password hashing and strength validation.
//!
//! Hashing uses Argon2id with a per-call random salt, so the same
//! password never produces the same hash twice. Strength checks run
//! before hashing on every password-setting path (register, reset,
//! change, setup).

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};

use crate::services::ServiceError;

/// Newtype for plaintext passwords to keep them out of logs.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Tunable Argon2 cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        // Argon2id defaults per the argon2 crate (19 MiB, t=2, p=1).
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashCost {
    fn hasher(&self) -> Result<Argon2<'static>, ServiceError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("invalid argon2 params: {e}")))?;
        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }
}

/// Hash a password with Argon2id. Blocking; call through
/// [`hash_password`] from async contexts.
pub fn hash_password_blocking(password: &Password, cost: HashCost) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = cost
        .hasher()?
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. Returns `Ok(false)` on
/// mismatch; errors are reserved for malformed hashes.
pub fn verify_password_blocking(password: &Password, hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("malformed password hash: {e}")))?;
    match Argon2::default().verify_password(password.as_str().as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(ServiceError::Internal(anyhow::anyhow!(
            "password verification failed: {e}"
        ))),
    }
}

/// Async wrapper: the adaptive hash is CPU-bound, so it runs on the
/// blocking thread pool instead of stalling the runtime.
pub async fn hash_password(password: &Password, cost: HashCost) -> Result<String, ServiceError> {
    let password = password.clone();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password, cost))
        .await
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("hash task failed: {e}")))?
}

/// Async wrapper around [`verify_password_blocking`].
pub async fn verify_password(password: &Password, hash: &str) -> Result<bool, ServiceError> {
    let password = password.clone();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || verify_password_blocking(&password, &hash))
        .await
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("verify task failed: {e}")))?
}

/// Password composition policy.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

const SPECIAL_CHARS: &str = "!@#$%^&*()-_=+[]{}|\\;:'\",.<>/?`~";

impl PasswordPolicy {
    /// Collect every violation so the caller can report them all at once.
    pub fn violations(&self, password: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if password.chars().count() < self.min_length {
            errors.push(format!(
                "Password must be at least {} characters long",
                self.min_length
            ));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push("Password must contain at least one uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push("Password must contain at least one lowercase letter".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least one number".to_string());
        }
        if self.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
            errors.push("Password must contain at least one special character".to_string());
        }

        errors
    }

    /// Gate used by every password-setting path.
    pub fn validate(&self, password: &str) -> Result<(), ServiceError> {
        let errors = self.violations(password);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(errors))
        }
    }
}
