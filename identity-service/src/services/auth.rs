//! Auth orchestrator.
//!
//! Coordinates the credential store, token codec, single-use token
//! ledger, permission cache and persistence for every mutating auth
//! flow. Expected outcomes come back as `Err(ServiceError)` values the
//! transport layer maps onto responses; multi-write steps go through
//! the store's atomic operations so no flow leaves partial state.

use std::sync::Arc;

use uuid::Uuid;

use crate::dtos::auth::{LoginRequest, RegisterRequest};
use crate::models::{
    ContactKind, ContactView, RefreshTokenRecord, TokenPurpose, User, UserSnapshot,
};
use crate::services::email::EmailProvider;
use crate::services::ledger::SingleUseTokens;
use crate::services::rbac::{Permission, PermissionCache, RequireLogic};
use crate::services::store::{AuthStore, NewContact, NewUser, PasswordReplacement};
use crate::services::token::{
    hash_opaque_token, SessionClaims, TokenCodec, TokenError, TokenErrorKind, TokenType,
};
use crate::services::ServiceError;
use crate::utils::contact::{detect_kind, format_contact, validate_format};
use crate::utils::password::{hash_password, verify_password, HashCost, Password, PasswordPolicy};

/// Role granted to self-registered accounts.
pub const DEFAULT_ROLE: &str = "user";

/// Successful login payload handed to the transport layer, which moves
/// the raw tokens into cookies.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: UserSnapshot,
    pub permissions: Vec<String>,
    pub access_token: String,
    pub refresh_token: String,
}

/// Rotated token pair.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    codec: TokenCodec,
    tokens: SingleUseTokens,
    email: Arc<dyn EmailProvider>,
    permissions: Arc<PermissionCache>,
    policy: PasswordPolicy,
    hash_cost: HashCost,
    frontend_base_url: String,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn AuthStore>,
        codec: TokenCodec,
        tokens: SingleUseTokens,
        email: Arc<dyn EmailProvider>,
        permissions: Arc<PermissionCache>,
        policy: PasswordPolicy,
        hash_cost: HashCost,
        frontend_base_url: String,
    ) -> Self {
        Self {
            store,
            codec,
            tokens,
            email,
            permissions,
            policy,
            hash_cost,
            frontend_base_url,
        }
    }

    pub fn permission_cache(&self) -> &Arc<PermissionCache> {
        &self.permissions
    }

    // ==================== Registration ====================

    /// Register a new account. No tokens are issued; registration is
    /// not auto-login.
    pub async fn register(&self, req: RegisterRequest) -> Result<UserSnapshot, ServiceError> {
        self.policy.validate(&req.password)?;

        if !req
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(ServiceError::validation(
                "Username can only contain letters, numbers, underscores and periods",
            ));
        }

        if self
            .store
            .find_user_by_username(&req.username)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict("Username is already taken".to_string()));
        }

        let contacts = self.prepare_contacts(&req.contacts)?;

        let password_hash = hash_password(&Password::new(req.password), self.hash_cost).await?;

        // User + contacts + history row + default role commit together;
        // any conflict inside rolls the whole registration back.
        let user = self
            .store
            .create_user(NewUser {
                username: req.username,
                password_hash,
                first_name: req.first_name,
                last_name: req.last_name,
                contacts,
                default_role: Some(DEFAULT_ROLE.to_string()),
            })
            .await?;

        tracing::info!(user_id = %user.id, username = %user.username, "user registered");

        self.snapshot(&user).await
    }

    fn prepare_contacts(
        &self,
        inputs: &[crate::dtos::auth::ContactInput],
    ) -> Result<Vec<NewContact>, ServiceError> {
        let mut contacts = Vec::with_capacity(inputs.len());
        let mut primary_seen: Vec<ContactKind> = Vec::new();

        for input in inputs {
            let kind: ContactKind = input.contact_type.parse().map_err(|_| {
                ServiceError::validation(format!(
                    "Contact type '{}' is invalid",
                    input.contact_type
                ))
            })?;
            let value = format_contact(&input.value, kind);
            validate_format(&value, kind).map_err(ServiceError::validation)?;

            // First contact of each kind becomes the primary one.
            let is_primary = !primary_seen.contains(&kind);
            if is_primary {
                primary_seen.push(kind);
            }

            contacts.push(NewContact {
                kind,
                value,
                is_primary,
            });
        }

        if !contacts.iter().any(|c| c.kind == ContactKind::Email) {
            return Err(ServiceError::validation(
                "At least one email contact is required",
            ));
        }

        Ok(contacts)
    }

    // ==================== Sessions ====================

    /// Login with a primary contact and password.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginOutcome, ServiceError> {
        let kind = self.resolve_contact_kind(&req.contact, req.contact_type.as_deref())?;
        let value = format_contact(&req.contact, kind);

        // Identity resolution is restricted to primary contacts; the
        // miss is indistinguishable from a wrong password.
        let user = self
            .store
            .find_user_by_primary_contact(&value, kind)
            .await?
            .ok_or(ServiceError::Credential)?;

        if !user.is_active {
            return Err(ServiceError::State("Account is inactive".to_string()));
        }

        let current_hash = self
            .store
            .latest_password_hash(user.id)
            .await?
            .ok_or_else(|| ServiceError::State("Account setup is incomplete".to_string()))?;

        if !verify_password(&Password::new(req.password), &current_hash).await? {
            return Err(ServiceError::Credential);
        }

        // Force-fresh permissions into the login response.
        self.permissions.invalidate(user.id);
        let resolved = self.permissions.get(user.id).await?;
        let role_names: Vec<String> = resolved.roles.iter().map(|r| r.name.clone()).collect();

        let access_token = self
            .codec
            .issue_access(user.id, &user.username, role_names)?;
        let refresh_token = self.codec.issue_refresh(user.id)?;

        self.store
            .create_refresh_record(RefreshTokenRecord::new(
                user.id,
                hash_opaque_token(&refresh_token),
                self.codec.refresh_ttl_days(),
            ))
            .await?;

        tracing::info!(user_id = %user.id, "login succeeded");

        Ok(LoginOutcome {
            user: self.snapshot(&user).await?,
            permissions: resolved.permissions.as_strings(),
            access_token,
            refresh_token,
        })
    }

    /// Invalidate the presented refresh token. Succeeds even when the
    /// access token has already expired (identity is then recovered
    /// from the refresh token itself) and never reports failure to the
    /// caller.
    pub async fn logout(&self, claims: Option<SessionClaims>, refresh_token: &str) {
        let user_id = match claims {
            Some(claims) => Some(claims.sub),
            None => self
                .codec
                .verify(refresh_token, TokenType::Refresh)
                .ok()
                .map(|c| c.sub),
        };

        let Some(user_id) = user_id else {
            tracing::debug!("logout with unresolvable identity");
            return;
        };

        let token_hash = hash_opaque_token(refresh_token);
        match self
            .store
            .find_active_refresh_record(user_id, &token_hash)
            .await
        {
            Ok(Some(record)) => {
                if let Err(e) = self.store.delete_refresh_record(record.id).await {
                    tracing::warn!(user_id = %user_id, error = %e, "logout cleanup failed");
                } else {
                    tracing::info!(user_id = %user_id, "logout succeeded");
                }
            }
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "logout with unknown refresh token");
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "logout lookup failed");
            }
        }
    }

    /// Rotate a refresh token: the old record is deleted strictly-once
    /// before the new pair is issued, so a replayed (or racing) token
    /// can never be redeemed twice.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, ServiceError> {
        let claims = self.codec.verify(refresh_token, TokenType::Refresh)?;

        let record = self
            .store
            .find_active_refresh_record(claims.sub, &hash_opaque_token(refresh_token))
            .await?
            .ok_or_else(|| {
                tracing::debug!(user_id = %claims.sub, "refresh token not on record");
                ServiceError::Token(TokenError::new(TokenErrorKind::NotFound))
            })?;

        if record.is_expired() {
            return Err(ServiceError::Token(TokenError::new(TokenErrorKind::Expired)));
        }

        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or(ServiceError::Credential)?;
        if !user.is_active {
            return Err(ServiceError::State("Account is inactive".to_string()));
        }

        // The losing side of a concurrent rotation stops here.
        if !self.store.delete_refresh_record(record.id).await? {
            tracing::warn!(user_id = %user.id, "refresh token consumed concurrently");
            return Err(ServiceError::Token(TokenError::new(TokenErrorKind::Used)));
        }

        let roles = self.store.active_roles_for_user(user.id).await?;
        let role_names: Vec<String> = roles.iter().map(|r| r.name.clone()).collect();

        let access_token = self
            .codec
            .issue_access(user.id, &user.username, role_names)?;
        let new_refresh_token = self.codec.issue_refresh(user.id)?;

        self.store
            .create_refresh_record(RefreshTokenRecord::new(
                user.id,
                hash_opaque_token(&new_refresh_token),
                self.codec.refresh_ttl_days(),
            ))
            .await?;

        tracing::info!(user_id = %user.id, "refresh token rotated");

        Ok(RefreshOutcome {
            access_token,
            refresh_token: new_refresh_token,
        })
    }

    // ==================== Password lifecycle ====================

    /// Issue a reset token for the account behind a primary contact.
    /// The outcome is deliberately indistinguishable to the caller
    /// whether or not the contact exists; only the email path sends
    /// anything, and delivery failures are swallowed.
    pub async fn forgot_password(
        &self,
        contact: &str,
        contact_type: Option<&str>,
    ) -> Result<(), ServiceError> {
        let kind = self.resolve_contact_kind(contact, contact_type)?;
        let value = format_contact(contact, kind);

        let Some(user) = self.store.find_user_by_primary_contact(&value, kind).await? else {
            tracing::debug!("password reset requested for unknown contact");
            return Ok(());
        };

        if kind != ContactKind::Email {
            // No SMS delivery path; acknowledge without revealing.
            tracing::debug!(user_id = %user.id, "password reset requested for non-email contact");
            return Ok(());
        }

        let reset_token = self
            .tokens
            .issue(user.id, TokenPurpose::PasswordReset)
            .await?;

        if let Err(e) = self
            .email
            .send_password_reset_email(&value, &reset_token, user.id, &self.frontend_base_url)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %e, "reset email delivery failed");
        }

        Ok(())
    }

    /// Redeem a reset token and replace the password. All side effects
    /// (history append, token consumption, refresh deactivation) commit
    /// atomically with the password write.
    pub async fn reset_password(
        &self,
        token: &str,
        user_id: Uuid,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        self.policy.validate(new_password)?;

        let record = self
            .tokens
            .validate(user_id, token, TokenPurpose::PasswordReset)
            .await?;

        let user = self.active_user(user_id).await?;

        let new_hash = hash_password(&Password::new(new_password), self.hash_cost).await?;
        self.store
            .replace_password(
                user.id,
                PasswordReplacement {
                    new_hash,
                    consume_token: Some(record.id),
                    mark_verified: false,
                },
            )
            .await?;

        tracing::info!(user_id = %user.id, "password reset completed");
        Ok(())
    }

    /// Authenticated password change.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        self.policy.validate(new_password)?;

        let user = self.active_user(user_id).await?;

        let current_hash = self
            .store
            .latest_password_hash(user.id)
            .await?
            .ok_or_else(|| ServiceError::State("Account setup is incomplete".to_string()))?;

        if !verify_password(&Password::new(old_password.to_string()), &current_hash).await? {
            return Err(ServiceError::Credential);
        }

        // Same-password check goes through the verify function, not a
        // string compare: the stored value is salted.
        if verify_password(&Password::new(new_password.to_string()), &current_hash).await? {
            return Err(ServiceError::validation(
                "New password must be different from current password",
            ));
        }

        let new_hash = hash_password(&Password::new(new_password), self.hash_cost).await?;
        self.store
            .replace_password(
                user.id,
                PasswordReplacement {
                    new_hash,
                    consume_token: None,
                    mark_verified: false,
                },
            )
            .await?;

        tracing::info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// First-time password setup, gated by an account-setup token.
    /// Marks the account verified.
    pub async fn setup_password(
        &self,
        token: &str,
        user_id: Uuid,
        password: &str,
    ) -> Result<(), ServiceError> {
        self.policy.validate(password)?;

        let record = self
            .tokens
            .validate(user_id, token, TokenPurpose::AccountSetup)
            .await?;

        let user = self.active_user(user_id).await?;

        let new_hash = hash_password(&Password::new(password), self.hash_cost).await?;
        self.store
            .replace_password(
                user.id,
                PasswordReplacement {
                    new_hash,
                    consume_token: Some(record.id),
                    mark_verified: true,
                },
            )
            .await?;

        tracing::info!(user_id = %user.id, "account setup completed");
        Ok(())
    }

    /// Issue and deliver an account-setup link to the user's primary
    /// email (used when accounts are provisioned by an administrator).
    pub async fn issue_setup_token(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let user = self.active_user(user_id).await?;

        let email_contact = self
            .store
            .contacts_for_user(user.id)
            .await?
            .into_iter()
            .find(|c| c.kind == ContactKind::Email && c.is_primary)
            .ok_or_else(|| {
                ServiceError::State("User has no primary email contact".to_string())
            })?;

        let setup_token = self
            .tokens
            .issue(user.id, TokenPurpose::AccountSetup)
            .await?;

        self.email
            .send_setup_password_email(
                &email_contact.value,
                &setup_token,
                user.id,
                &self.frontend_base_url,
            )
            .await?;

        Ok(())
    }

    // ==================== Contacts ====================

    /// Contact verification. Only the lookup is implemented.
    pub async fn verify_contact(
        &self,
        user_id: Uuid,
        contact_id: Uuid,
        _code: &str,
    ) -> Result<(), ServiceError> {
        self.store
            .find_contact_for_user(user_id, contact_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Contact not found".to_string()))?;

        // TODO: check the submitted code once an OTP delivery channel
        // is chosen for contact verification.

        Ok(())
    }

    // ==================== Introspection ====================

    pub async fn current_user(
        &self,
        user_id: Uuid,
    ) -> Result<(UserSnapshot, Vec<String>), ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let resolved = self.permissions.get(user.id).await?;
        Ok((
            self.snapshot(&user).await?,
            resolved.permissions.as_strings(),
        ))
    }

    /// The gate used by every protected route.
    pub async fn check_permission(
        &self,
        user_id: Uuid,
        required: &[Permission],
        logic: RequireLogic,
    ) -> Result<bool, ServiceError> {
        self.permissions.check(user_id, required, logic).await
    }

    // ==================== Helpers ====================

    fn resolve_contact_kind(
        &self,
        contact: &str,
        explicit: Option<&str>,
    ) -> Result<ContactKind, ServiceError> {
        match explicit {
            Some(name) => name.parse().map_err(|_| {
                ServiceError::validation(format!("Contact type '{name}' is invalid"))
            }),
            None => detect_kind(contact).ok_or_else(|| {
                ServiceError::validation(
                    "Unable to detect contact type; specify it or use a valid email/phone",
                )
            }),
        }
    }

    async fn active_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        if !user.is_active {
            return Err(ServiceError::State("Account is inactive".to_string()));
        }
        Ok(user)
    }

    async fn snapshot(&self, user: &User) -> Result<UserSnapshot, ServiceError> {
        let contacts = self.store.contacts_for_user(user.id).await?;
        let roles = self.store.active_roles_for_user(user.id).await?;
        Ok(UserSnapshot::assemble(
            user,
            contacts.iter().map(ContactView::from).collect(),
            roles.iter().map(|r| r.info()).collect(),
        ))
    }
}
