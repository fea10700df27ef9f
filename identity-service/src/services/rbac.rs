//! Role-based access control: permission types, aggregation and the
//! per-identity cache.
//!
//! Permissions are typed internally (a resource name plus a closed
//! [`Action`] set) and only serialize to the `resource:action` wire
//! string at the boundary. The `manage` action widens at *check* time:
//! holding `tasks:manage` satisfies any `tasks:*` requirement, while
//! the stored set stays a literal list.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RoleInfo;
use crate::services::store::AuthStore;
use crate::services::ServiceError;

/// Closed action set. `Manage` is the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Assign,
    Revoke,
    Manage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Assign => "assign",
            Action::Revoke => "revoke",
            Action::Manage => "manage",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "assign" => Ok(Action::Assign),
            "revoke" => Ok(Action::Revoke),
            "manage" => Ok(Action::Manage),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// A single grant: resource plus action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub resource: String,
    pub action: Action,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: Action) -> Self {
        Self {
            resource: resource.into(),
            action,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, action) = s
            .split_once(':')
            .ok_or_else(|| format!("permission '{s}' is not resource:action"))?;
        if resource.is_empty() {
            return Err(format!("permission '{s}' has an empty resource"));
        }
        Ok(Permission {
            resource: resource.to_string(),
            action: action.parse()?,
        })
    }
}

/// AND/OR combinator selector for multi-permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequireLogic {
    All,
    Any,
}

/// The deduplicated grants held by an identity.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    granted: HashSet<Permission>,
}

impl PermissionSet {
    pub fn insert(&mut self, permission: Permission) {
        self.granted.insert(permission);
    }

    pub fn len(&self) -> usize {
        self.granted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }

    /// Exact match, or `resource:manage` widening.
    pub fn has(&self, required: &Permission) -> bool {
        if self.granted.contains(required) {
            return true;
        }
        self.granted
            .contains(&Permission::new(required.resource.clone(), Action::Manage))
    }

    /// OR combinator; an empty requirement list is vacuously true.
    pub fn has_any(&self, required: &[Permission]) -> bool {
        required.is_empty() || required.iter().any(|p| self.has(p))
    }

    /// AND combinator; an empty requirement list is vacuously true.
    pub fn has_all(&self, required: &[Permission]) -> bool {
        required.iter().all(|p| self.has(p))
    }

    pub fn check(&self, required: &[Permission], logic: RequireLogic) -> bool {
        match logic {
            RequireLogic::All => self.has_all(required),
            RequireLogic::Any => self.has_any(required),
        }
    }

    /// Wire form: sorted `resource:action` strings.
    pub fn as_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = self.granted.iter().map(Permission::to_string).collect();
        out.sort();
        out
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self {
            granted: iter.into_iter().collect(),
        }
    }
}

/// Roles plus aggregated permissions for one identity.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPermissions {
    pub roles: Vec<RoleInfo>,
    pub permissions: PermissionSet,
}

/// Where resolved permissions come from. The cache talks to this
/// seam, so tests can count fetches with a stub.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn load(&self, user_id: Uuid) -> Result<ResolvedPermissions, ServiceError>;
}

/// Aggregates roles and permissions out of the store.
pub struct RoleAggregator {
    store: Arc<dyn AuthStore>,
}

impl RoleAggregator {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PermissionSource for RoleAggregator {
    async fn load(&self, user_id: Uuid) -> Result<ResolvedPermissions, ServiceError> {
        let roles = self.store.active_roles_for_user(user_id).await?;
        let role_ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();

        let rows = if role_ids.is_empty() {
            Vec::new()
        } else {
            self.store.active_permissions_for_roles(&role_ids).await?
        };

        // Dedup happens naturally through the set; a permission granted
        // by two roles counts once.
        let mut permissions = PermissionSet::default();
        for row in rows {
            match row.action.parse::<Action>() {
                Ok(action) => permissions.insert(Permission::new(row.resource, action)),
                Err(_) => {
                    tracing::warn!(
                        permission_id = %row.id,
                        action = %row.action,
                        "skipping permission with unknown action"
                    );
                }
            }
        }

        Ok(ResolvedPermissions {
            roles: roles.iter().map(|r| r.info()).collect(),
            permissions,
        })
    }
}

/// Injectable time source so tests can step the clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct CacheEntry {
    resolved: ResolvedPermissions,
    expires_at: DateTime<Utc>,
}

/// Time-bounded per-identity cache in front of the aggregator.
///
/// An owned object with its TTL and clock injected at construction;
/// expired entries are treated as absent on the next read rather than
/// actively swept. Every code path that changes a user's roles or a
/// role's permissions must call [`invalidate`](Self::invalidate) for
/// each affected identity, or stale authorization persists for up to
/// the TTL window.
pub struct PermissionCache {
    source: Arc<dyn PermissionSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: DashMap<Uuid, CacheEntry>,
}

impl PermissionCache {
    pub fn new(source: Arc<dyn PermissionSource>, ttl: Duration) -> Self {
        Self::with_clock(source, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        source: Arc<dyn PermissionSource>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            clock,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Cached resolution, refreshed from the source when absent or
    /// expired. Racing populates resolve as last-write-wins; entries
    /// are idempotent reconstructions of the same truth.
    pub async fn get(&self, user_id: Uuid) -> Result<ResolvedPermissions, ServiceError> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(&user_id) {
            if entry.expires_at > now {
                return Ok(entry.resolved.clone());
            }
        }

        let resolved = self.source.load(user_id).await?;
        self.entries.insert(
            user_id,
            CacheEntry {
                resolved: resolved.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(resolved)
    }

    /// Drop one identity. Called after login and after every
    /// role/permission mutation touching the identity.
    pub fn invalidate(&self, user_id: Uuid) {
        self.entries.remove(&user_id);
    }

    /// Full clear, for bulk administrative permission changes.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// The gate used by every protected route.
    pub async fn check(
        &self,
        user_id: Uuid,
        required: &[Permission],
        logic: RequireLogic,
    ) -> Result<bool, ServiceError> {
        let resolved = self.get(user_id).await?;
        Ok(resolved.permissions.check(required, logic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn perms(specs: &[&str]) -> PermissionSet {
        specs
            .iter()
            .map(|s| s.parse::<Permission>().expect("permission literal"))
            .collect()
    }

    #[test]
    fn permission_wire_roundtrip() {
        let p: Permission = "tasks:read".parse().unwrap();
        assert_eq!(p.resource, "tasks");
        assert_eq!(p.action, Action::Read);
        assert_eq!(p.to_string(), "tasks:read");

        assert!("tasks".parse::<Permission>().is_err());
        assert!("tasks:fly".parse::<Permission>().is_err());
        assert!(":read".parse::<Permission>().is_err());
    }

    #[test]
    fn manage_widens_at_check_time() {
        let granted = perms(&["tasks:manage"]);
        assert!(granted.has(&"tasks:read".parse().unwrap()));
        assert!(granted.has(&"tasks:delete".parse().unwrap()));
        assert!(granted.has(&"tasks:manage".parse().unwrap()));
        // Widening never crosses resources.
        assert!(!granted.has(&"projects:read".parse().unwrap()));
        // The stored set stays literal.
        assert_eq!(granted.as_strings(), vec!["tasks:manage".to_string()]);
    }

    #[test]
    fn combinators_and_vacuous_truth() {
        let granted = perms(&["tasks:read", "projects:read"]);
        let read_tasks: Permission = "tasks:read".parse().unwrap();
        let delete_tasks: Permission = "tasks:delete".parse().unwrap();

        assert!(granted.has_any(&[read_tasks.clone(), delete_tasks.clone()]));
        assert!(!granted.has_all(&[read_tasks.clone(), delete_tasks.clone()]));
        assert!(granted.has_all(&[read_tasks]));
        assert!(granted.has_any(&[]));
        assert!(granted.has_all(&[]));
    }

    struct CountingSource {
        calls: AtomicUsize,
        resolved: ResolvedPermissions,
    }

    impl CountingSource {
        fn new(resolved: ResolvedPermissions) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                resolved,
            }
        }
    }

    #[async_trait]
    impl PermissionSource for CountingSource {
        async fn load(&self, _user_id: Uuid) -> Result<ResolvedPermissions, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.resolved.clone())
        }
    }

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Utc::now()),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn resolved_fixture() -> ResolvedPermissions {
        ResolvedPermissions {
            roles: vec![RoleInfo {
                id: Uuid::new_v4(),
                name: "user".to_string(),
            }],
            permissions: perms(&["tasks:read"]),
        }
    }

    #[tokio::test]
    async fn cache_hits_within_ttl() {
        let source = Arc::new(CountingSource::new(resolved_fixture()));
        let cache = PermissionCache::new(source.clone(), Duration::minutes(5));
        let user_id = Uuid::new_v4();

        cache.get(user_id).await.unwrap();
        cache.get(user_id).await.unwrap();
        cache.get(user_id).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch_within_ttl() {
        let source = Arc::new(CountingSource::new(resolved_fixture()));
        let cache = PermissionCache::new(source.clone(), Duration::minutes(5));
        let user_id = Uuid::new_v4();

        cache.get(user_id).await.unwrap();
        cache.invalidate(user_id);
        cache.get(user_id).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let source = Arc::new(CountingSource::new(resolved_fixture()));
        let clock = Arc::new(ManualClock::new());
        let cache = PermissionCache::with_clock(
            source.clone(),
            Duration::minutes(5),
            clock.clone(),
        );
        let user_id = Uuid::new_v4();

        cache.get(user_id).await.unwrap();
        clock.advance(Duration::minutes(4));
        cache.get(user_id).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::minutes(2));
        cache.get(user_id).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_identity() {
        let source = Arc::new(CountingSource::new(resolved_fixture()));
        let cache = PermissionCache::new(source.clone(), Duration::minutes(5));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        cache.get(a).await.unwrap();
        cache.get(b).await.unwrap();
        cache.invalidate_all();
        cache.get(a).await.unwrap();
        cache.get(b).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn check_applies_logic() {
        let source = Arc::new(CountingSource::new(resolved_fixture()));
        let cache = PermissionCache::new(source, Duration::minutes(5));
        let user_id = Uuid::new_v4();

        let read: Permission = "tasks:read".parse().unwrap();
        let delete: Permission = "tasks:delete".parse().unwrap();

        assert!(cache
            .check(user_id, &[read.clone(), delete.clone()], RequireLogic::Any)
            .await
            .unwrap());
        assert!(!cache
            .check(user_id, &[read, delete], RequireLogic::All)
            .await
            .unwrap());
    }
}
