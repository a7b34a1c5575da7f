//! Backing-store interfaces
//!
//! Narrow, read-mostly traits the engine consults. Real deployments would
//! back these with a database and a queue; the bundled [`InMemoryStore`]
//! backs them with maps and counts its queries so tests can assert the
//! bounded-query (no N+1) contract.

mod memory;

pub use memory::{FixedWindowLimiter, InMemoryStore};

use crate::authz::protection::ProtectionRule;
use crate::error::StoreError;
use crate::membership::{Membership, MembershipTarget};
use crate::model::{NamespaceId, PrincipalId, Resource, ResourceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// A stored sub-resource (badge, branch, package...) addressed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
    /// Remaining representation fields, projected (and redacted) on the way
    /// out.
    #[serde(default)]
    pub fields: Value,
    /// Epoch seconds; consulted for conditional mutations and default sort.
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

/// Collections of items a resource owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Badges,
    Branches,
    Packages,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Badges => "badges",
            Collection::Branches => "branches",
            Collection::Packages => "packages",
        }
    }
}

/// Stored credential record, looked up by raw token or basic-auth pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialRecord {
    pub id: u64,
    pub kind: crate::credential::CredentialKind,
    pub owner_id: PrincipalId,
    pub owner_kind: crate::model::PrincipalKind,
    #[serde(default)]
    pub scopes: BTreeSet<crate::model::Scope>,
    #[serde(default)]
    pub revoked: bool,
    /// Epoch seconds; `None` means non-expiring.
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub owner_blocked: bool,
    #[serde(default)]
    pub admin_mode: bool,
}

/// Resource, membership and item lookup.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn find_resource(&self, id: ResourceId) -> Result<Option<Resource>, StoreError>;

    /// Every grant the principal holds anywhere. One query per resolution;
    /// the resolver filters to reachable targets itself.
    async fn memberships_for_principal(
        &self,
        principal: PrincipalId,
    ) -> Result<Vec<Membership>, StoreError>;

    /// Every grant attached to a target (for member listing).
    async fn memberships_for_target(
        &self,
        target: MembershipTarget,
    ) -> Result<Vec<Membership>, StoreError>;

    /// Group shares into a namespace.
    async fn group_links_into(
        &self,
        namespace: NamespaceId,
    ) -> Result<Vec<GroupLink>, StoreError>;

    async fn list_items(
        &self,
        resource: ResourceId,
        collection: Collection,
    ) -> Result<Vec<Item>, StoreError>;

    async fn find_item(
        &self,
        resource: ResourceId,
        collection: Collection,
        name: &str,
    ) -> Result<Option<Item>, StoreError>;

    async fn insert_item(
        &self,
        resource: ResourceId,
        collection: Collection,
        item: Item,
    ) -> Result<(), StoreError>;

    async fn remove_item(
        &self,
        resource: ResourceId,
        collection: Collection,
        name: &str,
    ) -> Result<bool, StoreError>;

    async fn insert_membership(&self, membership: Membership) -> Result<(), StoreError>;

    async fn remove_membership(
        &self,
        target: MembershipTarget,
        principal: PrincipalId,
    ) -> Result<bool, StoreError>;
}

// Re-exported here so store implementations and the resolver share one type.
pub use crate::membership::GroupLink;

/// Credential lookup. `touch_last_used` is fire-and-forget: failures are
/// swallowed by implementations and never fail the request.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup_token(&self, raw: &str) -> Result<Option<CredentialRecord>, StoreError>;

    async fn lookup_basic(
        &self,
        username: &str,
        secret: &str,
    ) -> Result<Option<CredentialRecord>, StoreError>;

    fn touch_last_used(&self, credential_id: u64);
}

/// Protection rules matching a name within a resource.
#[async_trait]
pub trait ProtectionRuleStore: Send + Sync {
    async fn matching_rules(
        &self,
        resource: ResourceId,
        name: &str,
    ) -> Result<Vec<ProtectionRule>, StoreError>;

    async fn rules_for_resource(
        &self,
        resource: ResourceId,
    ) -> Result<Vec<ProtectionRule>, StoreError>;

    async fn upsert_rule(
        &self,
        resource: ResourceId,
        rule: ProtectionRule,
    ) -> Result<(), StoreError>;

    async fn remove_rule(&self, resource: ResourceId, pattern: &str) -> Result<bool, StoreError>;
}

/// External rate-limit gate, consulted before any authorization work.
pub trait RateLimiter: Send + Sync {
    fn throttled(&self, key: &str) -> bool;
}

/// Background job trigger. At-least-once, never awaited; duplicate
/// scheduling is tolerated.
pub trait JobTrigger: Send + Sync {
    fn enqueue(&self, job_name: &str, args: Value);
}

/// A limiter that never throttles (default when rate limiting is disabled).
#[derive(Debug, Default)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn throttled(&self, _key: &str) -> bool {
        false
    }
}

/// A job trigger that drops jobs on the floor (for tests and the demo
/// binary; deployments wire a real queue here).
#[derive(Debug, Default)]
pub struct NoopJobTrigger;

impl JobTrigger for NoopJobTrigger {
    fn enqueue(&self, job_name: &str, _args: Value) {
        tracing::trace!(job = job_name, "Dropping background job (noop trigger)");
    }
}
