//! User account model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ContactView, RoleInfo};

/// User entity. `password_hash` always points at the most recent row of
/// the append-only password history.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            first_name: None,
            last_name: None,
            is_active: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, first: Option<String>, last: Option<String>) -> Self {
        self.first_name = first;
        self.last_name = last;
        self
    }
}

/// User view returned to clients. Never carries credential material.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSnapshot {
    pub id: Uuid,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub contacts: Vec<ContactView>,
    pub roles: Vec<RoleInfo>,
}

impl UserSnapshot {
    pub fn assemble(user: &User, contacts: Vec<ContactView>, roles: Vec<RoleInfo>) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_active: user.is_active,
            is_verified: user.is_verified,
            contacts,
            roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_is_active_and_unverified() {
        let user = User::new("alice".to_string(), "$argon2id$...".to_string());
        assert!(user.is_active);
        assert!(!user.is_verified);
    }

    #[test]
    fn snapshot_drops_credential_material() {
        let user = User::new("alice".to_string(), "$argon2id$...".to_string());
        let snapshot = UserSnapshot::assemble(&user, vec![], vec![]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
    }
}
