//! Authorization decision engine
//!
//! Evaluates one [`ActionRequest`] at a time, fresh per request, with the
//! following precedence:
//! 1. Rate limiter (short-circuits to 429 before any other work)
//! 2. Unconditional authentication requirement (mutations)
//! 3. Credential scope sufficiency
//! 4. Resource existence (absence and no-access are indistinguishable for
//!    private resources by design)
//! 5. Feature gate (disabled feature: 403 to members, 404 to non-members)
//! 6. Self-service carve-out (removing one's own membership)
//! 7. Role vs minimum level, with visibility overrides for reads
//! 8. Protection rules (per-action thresholds on matching names)

use crate::authz::protection::ProtectedAction;
use crate::authz::visibility::{can_view_without_membership, feature_disabled};
use crate::authz::{OperationType, Verdict};
use crate::config::{DenialStyle, PolicyConfig};
use crate::error::StoreError;
use crate::membership::{AccessLevel, MembershipResolver};
use crate::model::{Feature, Principal, Resource, Scope};
use crate::store::{ProtectionRuleStore, RateLimiter};
use std::sync::Arc;
use tracing::{debug, trace};

/// Static description of an API operation's authorization requirements.
#[derive(Debug, Clone)]
pub struct Action {
    /// Unique operation name, e.g. `list_branches`
    pub name: &'static str,
    /// Endpoint family used as the policy-override key, e.g. `branches`
    pub endpoint: &'static str,
    pub operation: OperationType,
    /// Feature gate this operation sits behind, if any
    pub feature: Option<Feature>,
    /// Minimum membership level required
    pub minimum_level: AccessLevel,
    /// Protected-action class, checked against matching protection rules
    pub protected: Option<ProtectedAction>,
}

/// One authorization question: principal, resource, action, optional target
/// name for protection-rule matching. Built per inbound call, never stored.
#[derive(Debug)]
pub struct ActionRequest<'a> {
    pub principal: &'a Principal,
    pub resource: Option<&'a Resource>,
    pub action: &'a Action,
    /// Name of the specific item acted on (branch name, package name),
    /// for protection-rule matching
    pub target_name: Option<&'a str>,
    /// Set when the principal is acting on their own membership; permitted
    /// regardless of role, but only for principals holding a grant
    pub self_service: bool,
}

/// The decision engine. Stateless per call; all inputs arrive as arguments.
pub struct AuthorizationEngine {
    membership: MembershipResolver,
    rules: Arc<dyn ProtectionRuleStore>,
    limiter: Arc<dyn RateLimiter>,
}

impl AuthorizationEngine {
    pub fn new(
        membership: MembershipResolver,
        rules: Arc<dyn ProtectionRuleStore>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            membership,
            rules,
            limiter,
        }
    }

    /// Produce the verdict for one request.
    ///
    /// Denials are returned as verdicts; only backing-store failures error.
    pub async fn authorize(
        &self,
        request: &ActionRequest<'_>,
        policy: &PolicyConfig,
    ) -> Result<Verdict, StoreError> {
        let action = request.action;
        let principal = request.principal;

        debug!(
            action = action.name,
            principal = principal.id,
            resource = ?request.resource.map(|r| r.id),
            "Authorizing"
        );

        // 1. Rate limiter, before any authorization work.
        let throttle_key = format!("{}:{}", action.name, principal.id);
        if self.limiter.throttled(&throttle_key) {
            trace!(key = %throttle_key, "Throttled");
            return Ok(Verdict::TooManyRequests);
        }

        // 2. Mutations require a resolved principal unconditionally.
        if principal.is_anonymous() && action.operation.is_mutating() {
            return Ok(Verdict::Unauthorized);
        }

        // 3. Credential scope sufficiency.
        if !principal.is_anonymous() && !scope_permits(principal, action) {
            trace!("Insufficient credential scope");
            return Ok(Verdict::forbidden("403 Forbidden - insufficient scope"));
        }

        // 4. Resource existence. Absent resources and hidden resources
        // produce the same observable result.
        let Some(resource) = request.resource else {
            return Ok(Verdict::not_found("404 Project Not Found"));
        };

        let grant_level = self.membership.grant_level(principal, resource).await?;
        let level = apply_admin_override(principal, action.operation, grant_level);
        let is_member = level >= AccessLevel::Guest;
        let viewable = can_view_without_membership(principal, resource, action.feature);
        let hidden = Verdict::not_found(format!("404 {} Not Found", resource.kind_name()));

        trace!(grant = %grant_level, effective = %level, viewable, "Resolved access inputs");

        // 5. Feature gate: disabled features 403 members, 404 everyone else.
        if feature_disabled(resource, action.feature) {
            return Ok(if is_member {
                Verdict::forbidden("403 Forbidden")
            } else {
                hidden
            });
        }

        // 6. Self-service carve-out. Only principals who actually hold a
        // grant qualify; non-members fall through so private resources stay
        // indistinguishable from absent ones.
        if request.self_service && is_member {
            trace!("Self-service action permitted");
            return Ok(Verdict::Allow);
        }

        // 7. Role check.
        let passes_role = if action.operation.is_read_only() {
            level >= action.minimum_level
                || (viewable && action.minimum_level <= AccessLevel::Guest)
        } else {
            // Guests never pass mutations, whatever the nominal minimum.
            level > AccessLevel::Guest && level >= action.minimum_level
        };

        if !passes_role {
            return Ok(self.deny(principal, resource, action, is_member, viewable, policy, hidden));
        }

        // 8. Protection rules, only for protected actions with a target.
        if let (Some(protected), Some(name)) = (action.protected, request.target_name) {
            for rule in self.rules.matching_rules(resource.id, name).await? {
                let required = rule.required_level(protected);
                if level < required {
                    debug!(
                        pattern = %rule.pattern,
                        action = %protected,
                        required = %required,
                        "Protection rule violated"
                    );
                    return Ok(Verdict::forbidden(format!(
                        "403 Forbidden - '{}' is protected by rule '{}' ({} requires {} access)",
                        name, rule.pattern, protected, required
                    )));
                }
            }
        }

        Ok(Verdict::Allow)
    }

    /// Map a failed role check to the observable denial, preserving the
    /// authenticated-member/non-member asymmetry.
    fn deny(
        &self,
        principal: &Principal,
        resource: &Resource,
        action: &Action,
        is_member: bool,
        viewable: bool,
        policy: &PolicyConfig,
        hidden: Verdict,
    ) -> Verdict {
        if principal.is_anonymous() {
            // Reads only; anonymous mutations were rejected earlier.
            return if viewable { Verdict::Unauthorized } else { hidden };
        }

        if is_member {
            return match policy.member_denial_style(action.endpoint) {
                DenialStyle::Forbidden => Verdict::forbidden("403 Forbidden"),
                DenialStyle::NotFound => hidden,
            };
        }

        // Authenticated complete non-member: private resources stay hidden,
        // visible ones admit existence.
        if viewable || resource.visibility > crate::model::Visibility::Private {
            Verdict::forbidden("403 Forbidden")
        } else {
            hidden
        }
    }
}

/// Admins bypass role checks; mutations additionally require admin mode to
/// be active.
fn apply_admin_override(
    principal: &Principal,
    operation: OperationType,
    grant_level: AccessLevel,
) -> AccessLevel {
    if principal.is_admin() && (operation.is_read_only() || principal.admin_mode) {
        AccessLevel::Admin
    } else {
        grant_level
    }
}

/// Whether the principal's credential scopes cover the operation.
///
/// An empty scope set marks an internally-constructed (session) principal
/// and passes; resolved credentials always carry explicit scopes.
fn scope_permits(principal: &Principal, action: &Action) -> bool {
    if principal.scopes.is_empty() {
        return true;
    }

    let registry = action.feature == Some(Feature::PackageRegistry);
    if action.operation.is_read_only() {
        principal.has_scope(Scope::Api)
            || principal.has_scope(Scope::ReadApi)
            || principal.has_scope(Scope::Sudo)
            || (registry
                && (principal.has_scope(Scope::ReadRegistry)
                    || principal.has_scope(Scope::WriteRegistry)))
    } else {
        principal.has_scope(Scope::Api)
            || principal.has_scope(Scope::Sudo)
            || (registry && principal.has_scope(Scope::WriteRegistry))
    }
}
