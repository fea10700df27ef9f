//! Contacts bound to a user account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Base contact kinds. Primary-ness is a flag on the binding, not a
/// separate kind: at most one active primary contact exists per kind
/// per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Email,
    Mobile,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKind::Email => "email",
            ContactKind::Mobile => "mobile",
        }
    }
}

impl std::str::FromStr for ContactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" | "primary email" | "primary_email" => Ok(ContactKind::Email),
            "mobile" | "phone" | "primary mobile" | "primary_mobile" => Ok(ContactKind::Mobile),
            other => Err(format!("unknown contact type: {other}")),
        }
    }
}

impl std::fmt::Display for ContactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact value bound to a user.
#[derive(Debug, Clone)]
pub struct UserContact {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: ContactKind,
    pub value: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl UserContact {
    pub fn new(user_id: Uuid, kind: ContactKind, value: String, is_primary: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            value,
            is_primary,
            created_at: Utc::now(),
        }
    }
}

/// Contact view embedded in user snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactView {
    pub id: Uuid,
    pub kind: ContactKind,
    pub value: String,
    pub is_primary: bool,
}

impl From<&UserContact> for ContactView {
    fn from(c: &UserContact) -> Self {
        Self {
            id: c.id,
            kind: c.kind,
            value: c.value.clone(),
            is_primary: c.is_primary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_type_names() {
        assert_eq!("primary email".parse::<ContactKind>(), Ok(ContactKind::Email));
        assert_eq!("primary_mobile".parse::<ContactKind>(), Ok(ContactKind::Mobile));
        assert_eq!("phone".parse::<ContactKind>(), Ok(ContactKind::Mobile));
        assert!("carrier-pigeon".parse::<ContactKind>().is_err());
    }
}
