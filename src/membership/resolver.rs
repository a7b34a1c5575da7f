//! Membership resolver
//!
//! Effective access level is the maximum over every grant path reachable
//! from a resource: its own memberships, each ancestor namespace, and group
//! links shared into any of those namespaces (capped at the link level).
//! Path order never matters; ties break by taking the max, not first-match.

use crate::error::StoreError;
use crate::membership::types::{AccessLevel, Membership, MembershipTarget};
use crate::model::{NamespaceId, Principal, PrincipalId, Resource};
use crate::store::ResourceStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// One entry in a deduplicated member listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveMember {
    pub principal_id: PrincipalId,
    pub level: AccessLevel,
    /// True when the principal holds a grant directly on the resource (as
    /// opposed to only inherited or linked ones). Direct members are the
    /// only ones removable through the resource's member endpoints.
    pub direct: bool,
    pub updated_at: u64,
}

/// Resolves effective access levels and member listings.
pub struct MembershipResolver {
    store: Arc<dyn ResourceStore>,
}

impl MembershipResolver {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Maximum access level the principal holds over the resource through
    /// membership grants alone. Admin override is applied by the decision
    /// engine, not here, because it depends on the operation.
    pub async fn grant_level(
        &self,
        principal: &Principal,
        resource: &Resource,
    ) -> Result<AccessLevel, StoreError> {
        if principal.is_anonymous() {
            return Ok(AccessLevel::NoAccess);
        }

        // One query for every grant the principal holds anywhere, then a
        // pure in-memory reachability walk. Keeps the query count flat no
        // matter how deep the namespace chain is.
        let grants = self
            .store
            .memberships_for_principal(principal.id)
            .await?;

        let reachable = self.reachable_namespaces(resource).await?;

        let mut level = AccessLevel::NoAccess;
        for grant in grants.iter().filter(|g| g.grants_access()) {
            let granted = match grant.target {
                MembershipTarget::Resource(id) if id == resource.id => Some(grant.level),
                MembershipTarget::Namespace(ns) => {
                    reachable.get(&ns).map(|cap| grant.level.min(*cap))
                }
                _ => None,
            };
            if let Some(granted) = granted {
                trace!(target = ?grant.target, level = %granted, "Grant path");
                level = level.max(granted);
            }
        }

        debug!(principal = principal.id, resource = resource.id, level = %level, "Resolved grant level");
        Ok(level)
    }

    /// Namespaces whose memberships reach this resource, each mapped to the
    /// cap applied to levels granted through it (ancestors are uncapped,
    /// linked groups are capped at the link's max level).
    ///
    /// Memoized per call: a group linked into several ancestors keeps its
    /// highest cap.
    async fn reachable_namespaces(
        &self,
        resource: &Resource,
    ) -> Result<HashMap<NamespaceId, AccessLevel>, StoreError> {
        let mut reachable: HashMap<NamespaceId, AccessLevel> = HashMap::new();

        for &ns in &resource.namespace_chain {
            reachable.insert(ns, AccessLevel::Admin);

            for link in self.store.group_links_into(ns).await? {
                reachable
                    .entry(link.source_group)
                    .and_modify(|cap| *cap = (*cap).max(link.max_level))
                    .or_insert(link.max_level);
            }
        }

        Ok(reachable)
    }

    /// Enumerate every member of a resource exactly once at their maximum
    /// level across all grant paths, sorted by principal id.
    ///
    /// With `include_inherited` false, only grants held directly on the
    /// resource are listed.
    pub async fn list_members(
        &self,
        resource: &Resource,
        include_inherited: bool,
    ) -> Result<Vec<EffectiveMember>, StoreError> {
        let mut merged: HashMap<PrincipalId, EffectiveMember> = HashMap::new();

        let direct = self
            .store
            .memberships_for_target(MembershipTarget::Resource(resource.id))
            .await?;
        merge_grants(&mut merged, &direct, None, true);

        if include_inherited {
            let reachable = self.reachable_namespaces(resource).await?;
            for (&ns, &cap) in &reachable {
                let grants = self
                    .store
                    .memberships_for_target(MembershipTarget::Namespace(ns))
                    .await?;
                let cap = if cap == AccessLevel::Admin { None } else { Some(cap) };
                merge_grants(&mut merged, &grants, cap, false);
            }
        }

        let mut members: Vec<EffectiveMember> = merged.into_values().collect();
        members.sort_by_key(|m| m.principal_id);
        Ok(members)
    }

    /// The principal's grant held directly on the resource, if any.
    pub async fn direct_membership(
        &self,
        resource: &Resource,
        principal_id: PrincipalId,
    ) -> Result<Option<Membership>, StoreError> {
        let direct = self
            .store
            .memberships_for_target(MembershipTarget::Resource(resource.id))
            .await?;
        Ok(direct.into_iter().find(|m| m.principal_id == principal_id))
    }
}

fn merge_grants(
    merged: &mut HashMap<PrincipalId, EffectiveMember>,
    grants: &[Membership],
    cap: Option<AccessLevel>,
    direct: bool,
) {
    for grant in grants.iter().filter(|g| g.grants_access()) {
        let level = cap.map_or(grant.level, |c| grant.level.min(c));
        merged
            .entry(grant.principal_id)
            .and_modify(|m| {
                m.level = m.level.max(level);
                m.direct |= direct;
                m.updated_at = m.updated_at.max(grant.updated_at);
            })
            .or_insert(EffectiveMember {
                principal_id: grant.principal_id,
                level,
                direct,
                updated_at: grant.updated_at,
            });
    }
}
