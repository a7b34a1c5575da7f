//! In-memory store
//!
//! Backs every store trait with maps guarded by a single lock. Each trait
//! call bumps a query counter so tests can assert the bounded-query (no
//! N+1) listing contract. Seedable programmatically or from a TOML fixture
//! file.

use crate::authz::protection::{ProtectionRule, RuleMatcher};
use crate::credential::CredentialKind;
use crate::error::StoreError;
use crate::membership::{GroupLink, Membership, MembershipTarget};
use crate::model::{NamespaceId, PrincipalId, PrincipalKind, Resource, ResourceId, Scope};
use crate::store::{Collection, CredentialRecord, CredentialStore, Item, ProtectionRuleStore, RateLimiter, ResourceStore};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Default)]
struct Inner {
    resources: HashMap<ResourceId, Resource>,
    memberships: Vec<Membership>,
    group_links: Vec<GroupLink>,
    items: HashMap<(ResourceId, Collection), Vec<Item>>,
    credentials: HashMap<String, CredentialRecord>,
    basic_credentials: HashMap<(String, String), CredentialRecord>,
    rules: HashMap<ResourceId, Vec<ProtectionRule>>,
    next_item_id: u64,
}

/// Map-backed implementation of every store interface.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    queries: AtomicU64,
    last_used: Mutex<HashMap<u64, u64>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_item_id: 1,
                ..Inner::default()
            }),
            queries: AtomicU64::new(0),
            last_used: Mutex::new(HashMap::new()),
        }
    }

    /// Build a store from a TOML fixture string.
    pub fn from_fixture_str(fixture: &str) -> Result<Self, StoreError> {
        let fixtures: Fixtures =
            toml::from_str(fixture).map_err(|e| StoreError::Fixture(e.to_string()))?;

        let store = Self::new();
        for resource in fixtures.resources {
            store.seed_resource(resource);
        }
        for membership in fixtures.memberships {
            store.seed_membership(membership);
        }
        for link in fixtures.group_links {
            store.seed_group_link(link);
        }
        for item in fixtures.items {
            store.seed_item(item.resource, item.collection, item.item);
        }
        for rule in fixtures.protection_rules {
            // Reject unparseable patterns at load, not at request time.
            RuleMatcher::new(&rule.rule.pattern)
                .map_err(|e| StoreError::Fixture(e.to_string()))?;
            store.seed_protection_rule(rule.resource, rule.rule);
        }
        for credential in fixtures.credentials {
            let record = credential.record();
            match (credential.token, credential.username, credential.password) {
                (Some(token), _, _) => store.add_credential(&token, record),
                (None, Some(username), Some(password)) => {
                    store.add_basic_credential(&username, &password, record)
                }
                _ => {
                    return Err(StoreError::Fixture(
                        "credential needs either token or username+password".to_string(),
                    ));
                }
            }
        }
        Ok(store)
    }

    /// Build a store from a TOML fixture file.
    pub fn from_fixture_file(path: &str) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_fixture_str(&contents)
    }

    // Seeding helpers (also used heavily by tests).

    pub fn seed_resource(&self, resource: Resource) {
        self.write_inner().resources.insert(resource.id, resource);
    }

    pub fn seed_membership(&self, membership: Membership) {
        self.write_inner().memberships.push(membership);
    }

    pub fn seed_group_link(&self, link: GroupLink) {
        self.write_inner().group_links.push(link);
    }

    pub fn seed_item(&self, resource: ResourceId, collection: Collection, mut item: Item) {
        let mut inner = self.write_inner();
        if item.id == 0 {
            item.id = inner.next_item_id;
        }
        inner.next_item_id = inner.next_item_id.max(item.id) + 1;
        inner.items.entry((resource, collection)).or_default().push(item);
    }

    pub fn seed_protection_rule(&self, resource: ResourceId, rule: ProtectionRule) {
        self.write_inner().rules.entry(resource).or_default().push(rule);
    }

    pub fn add_credential(&self, token: &str, record: CredentialRecord) {
        self.write_inner().credentials.insert(token.to_string(), record);
    }

    pub fn add_basic_credential(&self, username: &str, secret: &str, record: CredentialRecord) {
        self.write_inner()
            .basic_credentials
            .insert((username.to_string(), secret.to_string()), record);
    }

    /// Number of store queries issued so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// How many times a credential's last-used timestamp was touched.
    pub fn last_used_count(&self, credential_id: u64) -> u64 {
        self.last_used
            .lock()
            .map(|counts| counts.get(&credential_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn count_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    // Lock access with poison recovery: log a warning and keep the data.

    fn read_inner(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            tracing::warn!("store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            tracing::warn!("store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn find_resource(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        self.count_query();
        Ok(self.read_inner().resources.get(&id).cloned())
    }

    async fn memberships_for_principal(
        &self,
        principal: PrincipalId,
    ) -> Result<Vec<Membership>, StoreError> {
        self.count_query();
        Ok(self.read_inner()
            .memberships
            .iter()
            .filter(|m| m.principal_id == principal)
            .cloned()
            .collect())
    }

    async fn memberships_for_target(
        &self,
        target: MembershipTarget,
    ) -> Result<Vec<Membership>, StoreError> {
        self.count_query();
        Ok(self.read_inner()
            .memberships
            .iter()
            .filter(|m| m.target == target)
            .cloned()
            .collect())
    }

    async fn group_links_into(
        &self,
        namespace: NamespaceId,
    ) -> Result<Vec<GroupLink>, StoreError> {
        self.count_query();
        Ok(self.read_inner()
            .group_links
            .iter()
            .filter(|l| l.shared_namespace == namespace)
            .cloned()
            .collect())
    }

    async fn list_items(
        &self,
        resource: ResourceId,
        collection: Collection,
    ) -> Result<Vec<Item>, StoreError> {
        self.count_query();
        Ok(self.read_inner()
            .items
            .get(&(resource, collection))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_item(
        &self,
        resource: ResourceId,
        collection: Collection,
        name: &str,
    ) -> Result<Option<Item>, StoreError> {
        self.count_query();
        Ok(self.read_inner()
            .items
            .get(&(resource, collection))
            .and_then(|items| items.iter().find(|i| i.name == name).cloned()))
    }

    async fn insert_item(
        &self,
        resource: ResourceId,
        collection: Collection,
        mut item: Item,
    ) -> Result<(), StoreError> {
        self.count_query();
        let mut inner = self.write_inner();
        if item.id == 0 {
            item.id = inner.next_item_id;
        }
        inner.next_item_id = inner.next_item_id.max(item.id) + 1;
        inner.items.entry((resource, collection)).or_default().push(item);
        Ok(())
    }

    async fn remove_item(
        &self,
        resource: ResourceId,
        collection: Collection,
        name: &str,
    ) -> Result<bool, StoreError> {
        self.count_query();
        let mut inner = self.write_inner();
        if let Some(items) = inner.items.get_mut(&(resource, collection)) {
            let before = items.len();
            items.retain(|i| i.name != name);
            return Ok(items.len() < before);
        }
        Ok(false)
    }

    async fn insert_membership(&self, membership: Membership) -> Result<(), StoreError> {
        self.count_query();
        self.write_inner().memberships.push(membership);
        Ok(())
    }

    async fn remove_membership(
        &self,
        target: MembershipTarget,
        principal: PrincipalId,
    ) -> Result<bool, StoreError> {
        self.count_query();
        let mut inner = self.write_inner();
        let before = inner.memberships.len();
        inner
            .memberships
            .retain(|m| !(m.target == target && m.principal_id == principal));
        Ok(inner.memberships.len() < before)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn lookup_token(&self, raw: &str) -> Result<Option<CredentialRecord>, StoreError> {
        self.count_query();
        Ok(self.read_inner().credentials.get(raw).cloned())
    }

    async fn lookup_basic(
        &self,
        username: &str,
        secret: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        self.count_query();
        Ok(self.read_inner()
            .basic_credentials
            .get(&(username.to_string(), secret.to_string()))
            .cloned())
    }

    fn touch_last_used(&self, credential_id: u64) {
        // Fire-and-forget; a poisoned lock is swallowed, never surfaced.
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used.entry(credential_id).or_insert(0) += 1;
        }
    }
}

#[async_trait]
impl ProtectionRuleStore for InMemoryStore {
    async fn matching_rules(
        &self,
        resource: ResourceId,
        name: &str,
    ) -> Result<Vec<ProtectionRule>, StoreError> {
        self.count_query();
        Ok(self.read_inner()
            .rules
            .get(&resource)
            .map(|rules| {
                rules
                    .iter()
                    .filter(|rule| {
                        RuleMatcher::new(&rule.pattern)
                            .map(|m| m.matches(name))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn rules_for_resource(
        &self,
        resource: ResourceId,
    ) -> Result<Vec<ProtectionRule>, StoreError> {
        self.count_query();
        Ok(self.read_inner()
            .rules
            .get(&resource)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_rule(
        &self,
        resource: ResourceId,
        rule: ProtectionRule,
    ) -> Result<(), StoreError> {
        self.count_query();
        let mut inner = self.write_inner();
        let rules = inner.rules.entry(resource).or_default();
        if let Some(existing) = rules.iter_mut().find(|r| r.pattern == rule.pattern) {
            // Last write wins for conflicting attributes on the same pattern.
            *existing = rule;
        } else {
            rules.push(rule);
        }
        Ok(())
    }

    async fn remove_rule(&self, resource: ResourceId, pattern: &str) -> Result<bool, StoreError> {
        self.count_query();
        let mut inner = self.write_inner();
        if let Some(rules) = inner.rules.get_mut(&resource) {
            let before = rules.len();
            rules.retain(|r| r.pattern != pattern);
            return Ok(rules.len() < before);
        }
        Ok(false)
    }
}

/// Fixed-window rate limiter keyed by arbitrary strings.
pub struct FixedWindowLimiter {
    limit: u32,
    window_secs: u64,
    state: Mutex<HashMap<String, (Instant, u32)>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window_secs,
            state: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn throttled(&self, key: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("rate limiter lock poisoned, recovering");
            poisoned.into_inner()
        });
        let now = Instant::now();
        let entry = state.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0).as_secs() >= self.window_secs {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 > self.limit
    }
}

// Fixture file shapes.

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Fixtures {
    resources: Vec<Resource>,
    memberships: Vec<Membership>,
    group_links: Vec<GroupLink>,
    items: Vec<FixtureItem>,
    protection_rules: Vec<FixtureRule>,
    credentials: Vec<FixtureCredential>,
}

#[derive(Debug, Deserialize)]
struct FixtureItem {
    resource: ResourceId,
    collection: Collection,
    #[serde(flatten)]
    item: Item,
}

#[derive(Debug, Deserialize)]
struct FixtureRule {
    resource: ResourceId,
    #[serde(flatten)]
    rule: ProtectionRule,
}

#[derive(Debug, Deserialize)]
struct FixtureCredential {
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    id: u64,
    kind: CredentialKind,
    owner_id: PrincipalId,
    owner_kind: PrincipalKind,
    #[serde(default)]
    scopes: BTreeSet<Scope>,
    #[serde(default)]
    revoked: bool,
    #[serde(default)]
    expires_at: Option<u64>,
    #[serde(default)]
    owner_blocked: bool,
    #[serde(default)]
    admin_mode: bool,
}

impl FixtureCredential {
    fn record(&self) -> CredentialRecord {
        CredentialRecord {
            id: self.id,
            kind: self.kind,
            owner_id: self.owner_id,
            owner_kind: self.owner_kind,
            scopes: self.scopes.clone(),
            revoked: self.revoked,
            expires_at: self.expires_at,
            owner_blocked: self.owner_blocked,
            admin_mode: self.admin_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceKind, Visibility};
    use serde_json::json;

    #[tokio::test]
    async fn test_item_crud() {
        let store = InMemoryStore::new();
        store
            .insert_item(
                1,
                Collection::Badges,
                Item {
                    id: 0,
                    name: "coverage".into(),
                    fields: json!({"link_url": "https://x"}),
                    created_at: 1,
                    updated_at: 1,
                },
            )
            .await
            .unwrap();

        let found = store.find_item(1, Collection::Badges, "coverage").await.unwrap();
        assert!(found.is_some());
        assert!(found.unwrap().id > 0);

        assert!(store.remove_item(1, Collection::Badges, "coverage").await.unwrap());
        assert!(!store.remove_item(1, Collection::Badges, "coverage").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_counter() {
        let store = InMemoryStore::new();
        let before = store.query_count();
        store.find_resource(1).await.unwrap();
        store.list_items(1, Collection::Branches).await.unwrap();
        assert_eq!(store.query_count(), before + 2);
    }

    #[tokio::test]
    async fn test_upsert_rule_last_write_wins() {
        let store = InMemoryStore::new();
        store
            .upsert_rule(1, ProtectionRule::maintainer_only("main"))
            .await
            .unwrap();
        let mut changed = ProtectionRule::maintainer_only("main");
        changed.delete_level = crate::membership::AccessLevel::Owner;
        store.upsert_rule(1, changed.clone()).await.unwrap();

        let rules = store.rules_for_resource(1).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0], changed);
    }

    #[tokio::test]
    async fn test_matching_rules_filters_by_pattern() {
        let store = InMemoryStore::new();
        store
            .upsert_rule(1, ProtectionRule::maintainer_only("release/*"))
            .await
            .unwrap();
        assert_eq!(store.matching_rules(1, "release/1.0").await.unwrap().len(), 1);
        assert!(store.matching_rules(1, "feature/x").await.unwrap().is_empty());
        assert!(store.matching_rules(2, "release/1.0").await.unwrap().is_empty());
    }

    #[test]
    fn test_fixed_window_limiter() {
        let limiter = FixedWindowLimiter::new(2, 60);
        assert!(!limiter.throttled("k"));
        assert!(!limiter.throttled("k"));
        assert!(limiter.throttled("k"));
        // Separate keys have separate budgets.
        assert!(!limiter.throttled("other"));
    }

    #[tokio::test]
    async fn test_fixture_loading() {
        let fixture = r#"
[[resources]]
id = 1
kind = "project"
path = "group/app"
visibility = "public"
namespace_chain = [100]

[[memberships]]
principal_id = 7
target = { resource = 1 }
level = "developer"

[[items]]
resource = 1
collection = "badges"
id = 1
name = "coverage"
created_at = 100
updated_at = 100

[items.fields]
link_url = "https://example.com"

[[protection_rules]]
resource = 1
pattern = "main"
delete_level = "owner"

[[credentials]]
token = "glpat-test"
id = 1
kind = "personal_access_token"
owner_id = 7
owner_kind = "user"
scopes = ["api"]
"#;
        let store = InMemoryStore::from_fixture_str(fixture).unwrap();

        let resource = store.find_resource(1).await.unwrap().unwrap();
        assert_eq!(resource.path, "group/app");
        assert_eq!(resource.visibility, Visibility::Public);
        assert_eq!(resource.kind, ResourceKind::Project);

        let grants = store.memberships_for_principal(7).await.unwrap();
        assert_eq!(grants.len(), 1);

        let badge = store.find_item(1, Collection::Badges, "coverage").await.unwrap();
        assert!(badge.is_some());

        let rules = store.matching_rules(1, "main").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].delete_level, crate::membership::AccessLevel::Owner);
        // Unspecified thresholds fall back to maintainer.
        assert_eq!(
            rules[0].push_level,
            crate::membership::AccessLevel::Maintainer
        );

        let record = store.lookup_token("glpat-test").await.unwrap().unwrap();
        assert_eq!(record.owner_id, 7);
    }

    #[test]
    fn test_invalid_fixture_pattern_rejected() {
        // Patterns are validated at load; this one is fine, so loads.
        let ok = r#"
[[protection_rules]]
resource = 1
pattern = "release/*"
"#;
        assert!(InMemoryStore::from_fixture_str(ok).is_ok());

        let bad = r#"
[[credentials]]
id = 1
kind = "session"
owner_id = 1
owner_kind = "user"
"#;
        // Credential with neither token nor basic pair is rejected.
        assert!(InMemoryStore::from_fixture_str(bad).is_err());
    }
}
