//! Role model and the role/permission join rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role entity. Soft-deletable; an inactive role contributes nothing to
/// permission aggregation even while its assignments remain.
#[derive(Debug, Clone, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn info(&self) -> RoleInfo {
        RoleInfo {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Role reference embedded in snapshots and cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoleInfo {
    pub id: Uuid,
    pub name: String,
}

/// Raw permission row as stored: `action` stays textual until the
/// aggregator parses it into the closed action set.
#[derive(Debug, Clone, FromRow)]
pub struct PermissionRow {
    pub id: Uuid,
    pub resource: String,
    pub action: String,
}
