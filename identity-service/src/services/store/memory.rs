//! In-memory store.
//!
//! Backs the integration tests and credential-free local runs. Atomic
//! semantics come for free: every operation holds the single lock for
//! its whole duration.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    ContactKind, PermissionRow, RefreshTokenRecord, Role, SingleUseTokenRecord, TokenPurpose,
    User, UserContact,
};
use crate::services::store::{AuthStore, NewUser, PasswordReplacement};
use crate::services::token::opaque_hashes_match;
use crate::services::ServiceError;

struct PasswordEntry {
    user_id: Uuid,
    password_hash: String,
}

struct RolePermission {
    role_id: Uuid,
    permission_id: Uuid,
    is_active: bool,
}

struct UserRole {
    user_id: Uuid,
    role_id: Uuid,
    is_active: bool,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    contacts: Vec<UserContact>,
    // Append-only; the last entry per user is the current credential.
    password_history: Vec<PasswordEntry>,
    roles: Vec<Role>,
    permissions: Vec<PermissionRow>,
    role_permissions: Vec<RolePermission>,
    user_roles: Vec<UserRole>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
    single_use_tokens: HashMap<Uuid, SingleUseTokenRecord>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store seeded with the same roles and permissions as the
    /// database migrations.
    pub fn new() -> Self {
        let store = Self {
            inner: Mutex::new(Inner::default()),
        };
        store.seed_role(
            "admin",
            Some("Full administrative access"),
            &[
                ("tasks", "manage"),
                ("projects", "manage"),
                ("users", "manage"),
                ("roles", "manage"),
            ],
        );
        store.seed_role(
            "user",
            Some("Default member role"),
            &[
                ("tasks", "create"),
                ("tasks", "read"),
                ("tasks", "update"),
                ("projects", "read"),
            ],
        );
        store
    }

    /// An empty store with no seeded roles.
    pub fn unseeded() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Create (or extend) a role with the given `resource:action`
    /// grants. Returns the role id.
    pub fn seed_role(
        &self,
        name: &str,
        description: Option<&str>,
        grants: &[(&str, &str)],
    ) -> Uuid {
        let mut inner = self.lock();
        let existing = inner.roles.iter().find(|r| r.name == name).map(|r| r.id);
        let role_id = match existing {
            Some(id) => id,
            None => {
                let role = Role::new(name.to_string(), description.map(str::to_string));
                let id = role.id;
                inner.roles.push(role);
                id
            }
        };

        for (resource, action) in grants {
            let existing = inner
                .permissions
                .iter()
                .find(|p| p.resource == *resource && p.action == *action)
                .map(|p| p.id);
            let permission_id = match existing {
                Some(id) => id,
                None => {
                    let row = PermissionRow {
                        id: Uuid::new_v4(),
                        resource: resource.to_string(),
                        action: action.to_string(),
                    };
                    let id = row.id;
                    inner.permissions.push(row);
                    id
                }
            };
            let already = inner
                .role_permissions
                .iter()
                .any(|rp| rp.role_id == role_id && rp.permission_id == permission_id);
            if !already {
                inner.role_permissions.push(RolePermission {
                    role_id,
                    permission_id,
                    is_active: true,
                });
            }
        }

        role_id
    }

    /// Assign a role by name. Returns false when the role is unknown.
    pub fn assign_role(&self, user_id: Uuid, role_name: &str) -> bool {
        let mut inner = self.lock();
        let Some(role_id) = inner
            .roles
            .iter()
            .find(|r| r.name == role_name)
            .map(|r| r.id)
        else {
            return false;
        };
        inner.user_roles.push(UserRole {
            user_id,
            role_id,
            is_active: true,
        });
        true
    }

    /// Deactivate a role assignment (permission-affecting mutation;
    /// callers must invalidate the permission cache for the user).
    pub fn deactivate_role(&self, user_id: Uuid, role_name: &str) {
        let mut inner = self.lock();
        let role_id = inner
            .roles
            .iter()
            .find(|r| r.name == role_name)
            .map(|r| r.id);
        if let Some(role_id) = role_id {
            for ur in inner
                .user_roles
                .iter_mut()
                .filter(|ur| ur.user_id == user_id && ur.role_id == role_id)
            {
                ur.is_active = false;
            }
        }
    }

    /// Flip the active flag on an account.
    pub fn set_active(&self, user_id: Uuid, active: bool) {
        if let Some(user) = self.lock().users.get_mut(&user_id) {
            user.is_active = active;
        }
    }

    pub fn password_history_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .password_history
            .iter()
            .filter(|e| e.user_id == user_id)
            .count()
    }

    pub fn active_refresh_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id && r.is_active)
            .count()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ServiceError> {
        let needle = username.to_lowercase();
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.username.to_lowercase() == needle)
            .cloned())
    }

    async fn find_user_by_primary_contact(
        &self,
        value: &str,
        kind: ContactKind,
    ) -> Result<Option<User>, ServiceError> {
        let inner = self.lock();
        let user_id = inner
            .contacts
            .iter()
            .find(|c| c.is_primary && c.kind == kind && c.value == value)
            .map(|c| c.user_id);
        Ok(user_id.and_then(|id| inner.users.get(&id).cloned()))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, ServiceError> {
        let mut inner = self.lock();

        let username = new_user.username.to_lowercase();
        if inner
            .users
            .values()
            .any(|u| u.username.to_lowercase() == username)
        {
            return Err(ServiceError::Conflict("Username is already taken".to_string()));
        }
        for contact in &new_user.contacts {
            if inner.contacts.iter().any(|c| c.value == contact.value) {
                return Err(ServiceError::Conflict(format!(
                    "Contact '{}' is already registered",
                    contact.value
                )));
            }
        }

        let user = User::new(new_user.username, new_user.password_hash)
            .with_name(new_user.first_name, new_user.last_name);

        for contact in &new_user.contacts {
            inner.contacts.push(UserContact::new(
                user.id,
                contact.kind,
                contact.value.clone(),
                contact.is_primary,
            ));
        }

        inner.password_history.push(PasswordEntry {
            user_id: user.id,
            password_hash: user.password_hash.clone(),
        });

        if let Some(role_name) = &new_user.default_role {
            let role_id = inner
                .roles
                .iter()
                .find(|r| r.name == *role_name)
                .map(|r| r.id);
            match role_id {
                Some(role_id) => {
                    inner.user_roles.push(UserRole {
                        user_id: user.id,
                        role_id,
                        is_active: true,
                    });
                }
                None => {
                    tracing::warn!(role = %role_name, "default role missing, user created without roles");
                }
            }
        }

        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn contacts_for_user(&self, user_id: Uuid) -> Result<Vec<UserContact>, ServiceError> {
        Ok(self
            .lock()
            .contacts
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_contact_for_user(
        &self,
        user_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<UserContact>, ServiceError> {
        Ok(self
            .lock()
            .contacts
            .iter()
            .find(|c| c.id == contact_id && c.user_id == user_id)
            .cloned())
    }

    async fn latest_password_hash(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        Ok(self
            .lock()
            .password_history
            .iter()
            .rev()
            .find(|e| e.user_id == user_id)
            .map(|e| e.password_hash.clone()))
    }

    async fn replace_password(
        &self,
        user_id: Uuid,
        replacement: PasswordReplacement,
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock();

        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        user.password_hash = replacement.new_hash.clone();
        user.updated_at = Utc::now();
        if replacement.mark_verified {
            user.is_verified = true;
        }

        inner.password_history.push(PasswordEntry {
            user_id,
            password_hash: replacement.new_hash,
        });

        if let Some(token_id) = replacement.consume_token {
            if let Some(token) = inner.single_use_tokens.get_mut(&token_id) {
                token.is_used = true;
            }
        }

        for record in inner
            .refresh_tokens
            .values_mut()
            .filter(|r| r.user_id == user_id)
        {
            record.is_active = false;
        }

        Ok(())
    }

    async fn active_roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let inner = self.lock();
        let mut roles: Vec<Role> = inner
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id && ur.is_active)
            .filter_map(|ur| {
                inner
                    .roles
                    .iter()
                    .find(|r| r.id == ur.role_id && r.is_active)
            })
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles.dedup_by_key(|r| r.id);
        Ok(roles)
    }

    async fn active_permissions_for_roles(
        &self,
        role_ids: &[Uuid],
    ) -> Result<Vec<PermissionRow>, ServiceError> {
        let inner = self.lock();
        Ok(inner
            .role_permissions
            .iter()
            .filter(|rp| rp.is_active && role_ids.contains(&rp.role_id))
            .filter_map(|rp| inner.permissions.iter().find(|p| p.id == rp.permission_id))
            .cloned()
            .collect())
    }

    async fn create_refresh_record(
        &self,
        record: RefreshTokenRecord,
    ) -> Result<(), ServiceError> {
        self.lock().refresh_tokens.insert(record.id, record);
        Ok(())
    }

    async fn find_active_refresh_record(
        &self,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError> {
        Ok(self
            .lock()
            .refresh_tokens
            .values()
            .find(|r| {
                r.user_id == user_id
                    && r.is_active
                    && opaque_hashes_match(&r.token_hash, token_hash)
            })
            .cloned())
    }

    async fn delete_refresh_record(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.lock().refresh_tokens.remove(&id).is_some())
    }

    async fn deactivate_refresh_records(&self, user_id: Uuid) -> Result<(), ServiceError> {
        for record in self
            .lock()
            .refresh_tokens
            .values_mut()
            .filter(|r| r.user_id == user_id)
        {
            record.is_active = false;
        }
        Ok(())
    }

    async fn create_single_use_token(
        &self,
        record: SingleUseTokenRecord,
    ) -> Result<(), ServiceError> {
        self.lock().single_use_tokens.insert(record.id, record);
        Ok(())
    }

    async fn find_single_use_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SingleUseTokenRecord>, ServiceError> {
        Ok(self
            .lock()
            .single_use_tokens
            .values()
            .find(|t| {
                t.user_id == user_id
                    && t.purpose == purpose
                    && opaque_hashes_match(&t.token_hash, token_hash)
            })
            .cloned())
    }

    async fn invalidate_single_use_tokens(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<(), ServiceError> {
        for token in self
            .lock()
            .single_use_tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && t.purpose == purpose && !t.is_used)
        {
            token.is_used = true;
        }
        Ok(())
    }
}
