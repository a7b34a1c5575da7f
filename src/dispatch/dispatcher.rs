//! The dispatcher
//!
//! One entry point per inbound call: resolve the principal, authorize,
//! execute, project. Denials come back as responses, never panics or
//! errors; only backing-store failures escape, and `dispatch` folds those
//! into a generic 500 so the client never sees internals.

use crate::authz::protection::{ProtectionRule, RuleMatcher};
use crate::authz::{Action, ActionRequest, AuthorizationEngine, OperationType, ProtectedAction};
use crate::config::PolicyConfig;
use crate::credential::{CredentialResolver, Resolution};
use crate::dispatch::{ApiRequest, ApiResponse, Operation};
use crate::error::{DispatchError, StoreError};
use crate::membership::{AccessLevel, Membership, MembershipResolver, MembershipState, MembershipTarget};
use crate::model::{Feature, Principal, Resource};
use crate::projection::{Page, Representation, SortSpec, project_item, project_items};
use crate::store::{
    Collection, CredentialStore, Item, JobTrigger, ProtectionRuleStore, RateLimiter, ResourceStore,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Chains the resolvers and the engine over one backing store.
pub struct Dispatcher {
    resolver: CredentialResolver,
    engine: AuthorizationEngine,
    membership: MembershipResolver,
    store: Arc<dyn ResourceStore>,
    rules: Arc<dyn ProtectionRuleStore>,
    jobs: Arc<dyn JobTrigger>,
    policy: PolicyConfig,
}

impl Dispatcher {
    pub fn new<S>(
        store: Arc<S>,
        policy: PolicyConfig,
        limiter: Arc<dyn RateLimiter>,
        jobs: Arc<dyn JobTrigger>,
    ) -> Self
    where
        S: ResourceStore + CredentialStore + ProtectionRuleStore + 'static,
    {
        Self {
            resolver: CredentialResolver::new(store.clone()),
            engine: AuthorizationEngine::new(
                MembershipResolver::new(store.clone()),
                store.clone(),
                limiter,
            ),
            membership: MembershipResolver::new(store.clone()),
            store: store.clone(),
            rules: store,
            jobs,
            policy,
        }
    }

    /// Process one request end to end. Infallible at this boundary: store
    /// failures are logged and rendered as a generic 500.
    pub async fn dispatch(&self, request: ApiRequest) -> ApiResponse {
        match self.handle(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Request failed against the backing store");
                ApiResponse::message(500, "500 Internal Server Error")
            }
        }
    }

    async fn handle(&self, request: &ApiRequest) -> Result<ApiResponse, StoreError> {
        let principal = match self.resolver.resolve(&request.credentials, request.now).await? {
            Resolution::Principal(p) => p,
            Resolution::NoPrincipal => Principal::anonymous(),
            Resolution::Rejected(err) => {
                debug!(error = %err, "Credential rejected");
                let status = err.http_status();
                let message = if status == 403 {
                    "403 Forbidden"
                } else {
                    "401 Unauthorized"
                };
                return Ok(ApiResponse::message(status, message));
            }
        };

        let resource = self
            .store
            .find_resource(request.operation.resource_id())
            .await?;

        let action = action_for(&request.operation);
        let self_service = match &request.operation {
            Operation::RemoveMember { user_id, .. } => {
                !principal.is_anonymous() && *user_id == principal.id
            }
            _ => false,
        };

        let verdict = self
            .engine
            .authorize(
                &ActionRequest {
                    principal: &principal,
                    resource: resource.as_ref(),
                    action: &action,
                    target_name: target_name(&request.operation),
                    self_service,
                },
                &self.policy,
            )
            .await?;

        if !verdict.is_allow() {
            return Ok(ApiResponse::from_verdict(&verdict));
        }

        // Unreachable when the verdict is Allow; kept as a guard rather
        // than an unwrap.
        let Some(resource) = resource else {
            return Ok(ApiResponse::message(404, "404 Project Not Found"));
        };

        info!(
            action = action.name,
            principal = principal.id,
            resource = resource.id,
            "Authorized"
        );

        self.execute(request, &principal, &resource).await
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        principal: &Principal,
        resource: &Resource,
    ) -> Result<ApiResponse, StoreError> {
        match &request.operation {
            Operation::ListBadges { .. } => {
                self.list_collection(request, resource, Collection::Badges, Representation::Badge)
                    .await
            }

            Operation::CreateBadge { name, fields, .. } => {
                if name.is_empty() {
                    return Ok(render_client_error(DispatchError::BadRequest(
                        "name is missing".to_string(),
                    )));
                }
                if self
                    .store
                    .find_item(resource.id, Collection::Badges, name)
                    .await?
                    .is_some()
                {
                    return Ok(render_client_error(DispatchError::Conflict(
                        "Badge already exists".to_string(),
                    )));
                }
                self.store
                    .insert_item(
                        resource.id,
                        Collection::Badges,
                        Item {
                            id: 0,
                            name: name.clone(),
                            fields: fields.clone(),
                            created_at: request.now,
                            updated_at: request.now,
                        },
                    )
                    .await?;
                let created = self
                    .store
                    .find_item(resource.id, Collection::Badges, name)
                    .await?
                    .ok_or_else(|| StoreError::Unavailable("created badge vanished".to_string()))?;
                Ok(ApiResponse::created(project_item(
                    Representation::Badge,
                    &created,
                )))
            }

            Operation::ListBranches { .. } => {
                self.list_collection(
                    request,
                    resource,
                    Collection::Branches,
                    Representation::Branch,
                )
                .await
            }

            Operation::GetBranch { name, .. } => {
                match self
                    .store
                    .find_item(resource.id, Collection::Branches, name)
                    .await?
                {
                    Some(branch) => Ok(ApiResponse::ok(project_item(
                        Representation::Branch,
                        &branch,
                    ))),
                    None => Ok(ApiResponse::message(404, "404 Branch Not Found")),
                }
            }

            Operation::DeleteBranch { name, .. } => {
                if !self
                    .store
                    .remove_item(resource.id, Collection::Branches, name)
                    .await?
                {
                    return Ok(ApiResponse::message(404, "404 Branch Not Found"));
                }
                Ok(ApiResponse::no_content())
            }

            Operation::ListProtectedBranches { .. } => {
                let mut rules = self.rules.rules_for_resource(resource.id).await?;
                rules.sort_by(|a, b| a.pattern.cmp(&b.pattern));
                let page = match Page::from_params(
                    request.list.page.as_deref(),
                    request.list.per_page.as_deref(),
                    &self.policy.pagination,
                ) {
                    Ok(page) => page,
                    Err(e) => return Ok(render_client_error(e)),
                };
                let (window, meta) = page.slice(&rules);
                let body = Value::Array(window.iter().map(rule_json).collect());
                Ok(ApiResponse::ok(body).with_headers(meta.headers()))
            }

            Operation::ProtectBranch {
                pattern, levels, ..
            } => {
                if pattern.is_empty() {
                    return Ok(render_client_error(DispatchError::BadRequest(
                        "name is missing".to_string(),
                    )));
                }
                if let Err(e) = RuleMatcher::new(pattern) {
                    return Ok(render_client_error(DispatchError::BadRequest(
                        e.to_string(),
                    )));
                }
                let rule = match parse_rule(pattern, levels) {
                    Ok(rule) => rule,
                    Err(e) => return Ok(render_client_error(e)),
                };
                // Idempotent: re-protecting upserts, last write wins.
                self.rules.upsert_rule(resource.id, rule.clone()).await?;
                Ok(ApiResponse::created(rule_json(&rule)))
            }

            Operation::UnprotectBranch { pattern, .. } => {
                // Idempotent: removing an absent rule is still a success.
                self.rules.remove_rule(resource.id, pattern).await?;
                Ok(ApiResponse::no_content())
            }

            Operation::ListMembers {
                include_inherited, ..
            } => {
                let members = self
                    .membership
                    .list_members(resource, *include_inherited)
                    .await?;
                let page = match Page::from_params(
                    request.list.page.as_deref(),
                    request.list.per_page.as_deref(),
                    &self.policy.pagination,
                ) {
                    Ok(page) => page,
                    Err(e) => return Ok(render_client_error(e)),
                };
                let (window, meta) = page.slice(&members);
                let body = Value::Array(
                    window
                        .iter()
                        .map(|m| {
                            json!({
                                "id": m.principal_id,
                                "access_level": m.level.value(),
                                "direct": m.direct,
                            })
                        })
                        .collect(),
                );
                Ok(ApiResponse::ok(body).with_headers(meta.headers()))
            }

            Operation::AddMember {
                user_id,
                access_level,
                ..
            } => {
                self.add_member(request, principal, resource, user_id, access_level)
                    .await
            }

            Operation::UpdateMember {
                user_id,
                access_level,
                ..
            } => {
                self.update_member(request, principal, resource, *user_id, access_level)
                    .await
            }

            Operation::RemoveMember { user_id, .. } => {
                let Some(membership) =
                    self.membership.direct_membership(resource, *user_id).await?
                else {
                    return Ok(ApiResponse::message(404, "404 Member Not Found"));
                };

                if let Some(threshold) = request.if_unmodified_since
                    && membership.updated_at > threshold
                {
                    return Ok(render_client_error(DispatchError::PreconditionFailed));
                }

                self.store
                    .remove_membership(MembershipTarget::Resource(resource.id), *user_id)
                    .await?;
                Ok(ApiResponse::no_content())
            }

            Operation::ListPackages { .. } => {
                self.list_collection(
                    request,
                    resource,
                    Collection::Packages,
                    Representation::Package,
                )
                .await
            }
        }
    }

    async fn add_member(
        &self,
        request: &ApiRequest,
        principal: &Principal,
        resource: &Resource,
        user_id: &Value,
        access_level: &Value,
    ) -> Result<ApiResponse, StoreError> {
        let Some(user_id) = user_id.as_u64() else {
            return Ok(render_client_error(DispatchError::BadRequest(
                "user_id is invalid".to_string(),
            )));
        };
        let Some(raw_level) = access_level.as_u64() else {
            return Ok(render_client_error(DispatchError::BadRequest(
                "access_level is invalid".to_string(),
            )));
        };

        let level = match u32::try_from(raw_level).ok().and_then(AccessLevel::from_value) {
            Some(level) if level > AccessLevel::NoAccess => level,
            _ => {
                return Ok(render_client_error(DispatchError::Unprocessable {
                    field: "access_level".to_string(),
                    reason: "is not included in the list".to_string(),
                }));
            }
        };

        // Nobody grants a level above their own. Admins in admin mode sit
        // at the top of the scale and are unaffected.
        let own = if principal.is_admin() && principal.admin_mode {
            AccessLevel::Admin
        } else {
            self.membership.grant_level(principal, resource).await?
        };
        if level > own {
            return Ok(ApiResponse::message(
                403,
                "403 Forbidden - access level is higher than your own",
            ));
        }

        if self
            .membership
            .direct_membership(resource, user_id)
            .await?
            .is_some()
        {
            return Ok(render_client_error(DispatchError::Conflict(
                "Member already exists".to_string(),
            )));
        }

        self.store
            .insert_membership(Membership {
                principal_id: user_id,
                target: MembershipTarget::Resource(resource.id),
                level,
                state: MembershipState::Active,
                updated_at: request.now,
            })
            .await?;

        Ok(ApiResponse::created(json!({
            "id": user_id,
            "access_level": level.value(),
        })))
    }

    async fn update_member(
        &self,
        request: &ApiRequest,
        principal: &Principal,
        resource: &Resource,
        user_id: u64,
        access_level: &Value,
    ) -> Result<ApiResponse, StoreError> {
        let Some(raw_level) = access_level.as_u64() else {
            return Ok(render_client_error(DispatchError::BadRequest(
                "access_level is invalid".to_string(),
            )));
        };
        let level = match u32::try_from(raw_level).ok().and_then(AccessLevel::from_value) {
            Some(level) if level > AccessLevel::NoAccess => level,
            _ => {
                return Ok(render_client_error(DispatchError::Unprocessable {
                    field: "access_level".to_string(),
                    reason: "is not included in the list".to_string(),
                }));
            }
        };

        let own = if principal.is_admin() && principal.admin_mode {
            AccessLevel::Admin
        } else {
            self.membership.grant_level(principal, resource).await?
        };
        if level > own {
            return Ok(ApiResponse::message(
                403,
                "403 Forbidden - access level is higher than your own",
            ));
        }

        let Some(membership) = self.membership.direct_membership(resource, user_id).await? else {
            return Ok(ApiResponse::message(404, "404 Member Not Found"));
        };
        if let Some(threshold) = request.if_unmodified_since
            && membership.updated_at > threshold
        {
            return Ok(render_client_error(DispatchError::PreconditionFailed));
        }

        self.store
            .remove_membership(MembershipTarget::Resource(resource.id), user_id)
            .await?;
        self.store
            .insert_membership(Membership {
                principal_id: user_id,
                target: MembershipTarget::Resource(resource.id),
                level,
                state: membership.state,
                updated_at: request.now,
            })
            .await?;

        Ok(ApiResponse::ok(json!({
            "id": user_id,
            "access_level": level.value(),
        })))
    }

    /// Shared list pipeline: sort, paginate, project, and prime the cache
    /// in the background.
    async fn list_collection(
        &self,
        request: &ApiRequest,
        resource: &Resource,
        collection: Collection,
        representation: Representation,
    ) -> Result<ApiResponse, StoreError> {
        let spec = match SortSpec::parse(
            request.list.order_by.as_deref(),
            request.list.sort.as_deref(),
        ) {
            Ok(spec) => spec,
            Err(e) => return Ok(render_client_error(e)),
        };
        let page = match Page::from_params(
            request.list.page.as_deref(),
            request.list.per_page.as_deref(),
            &self.policy.pagination,
        ) {
            Ok(page) => page,
            Err(e) => return Ok(render_client_error(e)),
        };

        let mut items = self.store.list_items(resource.id, collection).await?;
        spec.apply(&mut items);
        let (window, meta) = page.slice(&items);

        // At-least-once, never awaited.
        self.jobs.enqueue(
            "cache_prime",
            json!({ "resource": resource.id, "collection": collection.as_str() }),
        );

        Ok(ApiResponse::ok(project_items(representation, window)).with_headers(meta.headers()))
    }
}

/// Static authorization requirements per operation.
fn action_for(operation: &Operation) -> Action {
    match operation {
        Operation::ListBadges { .. } => Action {
            name: "list_badges",
            endpoint: "badges",
            operation: OperationType::Read,
            feature: None,
            minimum_level: AccessLevel::Guest,
            protected: None,
        },
        Operation::CreateBadge { .. } => Action {
            name: "create_badge",
            endpoint: "badges",
            operation: OperationType::Write,
            feature: None,
            minimum_level: AccessLevel::Maintainer,
            protected: None,
        },
        Operation::ListBranches { .. } => Action {
            name: "list_branches",
            endpoint: "branches",
            operation: OperationType::Read,
            feature: Some(Feature::Repository),
            minimum_level: AccessLevel::Guest,
            protected: None,
        },
        Operation::GetBranch { .. } => Action {
            name: "get_branch",
            endpoint: "branches",
            operation: OperationType::Read,
            feature: Some(Feature::Repository),
            minimum_level: AccessLevel::Guest,
            protected: None,
        },
        Operation::DeleteBranch { .. } => Action {
            name: "delete_branch",
            endpoint: "branches",
            operation: OperationType::Delete,
            feature: Some(Feature::Repository),
            minimum_level: AccessLevel::Developer,
            protected: Some(ProtectedAction::Delete),
        },
        Operation::ListProtectedBranches { .. } => Action {
            name: "list_protected_branches",
            endpoint: "protected_branches",
            operation: OperationType::Read,
            feature: Some(Feature::Repository),
            minimum_level: AccessLevel::Maintainer,
            protected: None,
        },
        Operation::ProtectBranch { .. } => Action {
            name: "protect_branch",
            endpoint: "protected_branches",
            operation: OperationType::Execute,
            feature: Some(Feature::Repository),
            minimum_level: AccessLevel::Maintainer,
            protected: None,
        },
        Operation::UnprotectBranch { .. } => Action {
            name: "unprotect_branch",
            endpoint: "protected_branches",
            operation: OperationType::Execute,
            feature: Some(Feature::Repository),
            minimum_level: AccessLevel::Maintainer,
            protected: Some(ProtectedAction::Unprotect),
        },
        Operation::ListMembers { .. } => Action {
            name: "list_members",
            endpoint: "members",
            operation: OperationType::Read,
            feature: None,
            minimum_level: AccessLevel::Guest,
            protected: None,
        },
        Operation::AddMember { .. } => Action {
            name: "add_member",
            endpoint: "members",
            operation: OperationType::Write,
            feature: None,
            minimum_level: AccessLevel::Maintainer,
            protected: None,
        },
        Operation::UpdateMember { .. } => Action {
            name: "update_member",
            endpoint: "members",
            operation: OperationType::Write,
            feature: None,
            minimum_level: AccessLevel::Maintainer,
            protected: None,
        },
        Operation::RemoveMember { .. } => Action {
            name: "remove_member",
            endpoint: "members",
            operation: OperationType::Delete,
            feature: None,
            minimum_level: AccessLevel::Maintainer,
            protected: None,
        },
        Operation::ListPackages { .. } => Action {
            name: "list_packages",
            endpoint: "packages",
            operation: OperationType::Read,
            feature: Some(Feature::PackageRegistry),
            minimum_level: AccessLevel::Guest,
            protected: None,
        },
    }
}

/// Item name fed to protection-rule matching, for operations that have one.
fn target_name(operation: &Operation) -> Option<&str> {
    match operation {
        Operation::DeleteBranch { name, .. } => Some(name),
        Operation::ProtectBranch { pattern, .. }
        | Operation::UnprotectBranch { pattern, .. } => Some(pattern),
        _ => None,
    }
}

fn parse_rule(pattern: &str, levels: &Value) -> Result<ProtectionRule, DispatchError> {
    Ok(ProtectionRule {
        pattern: pattern.to_string(),
        push_level: parse_level(levels, "push_access_level")?
            .unwrap_or(AccessLevel::Maintainer),
        delete_level: parse_level(levels, "delete_access_level")?
            .unwrap_or(AccessLevel::Maintainer),
        merge_level: parse_level(levels, "merge_access_level")?
            .unwrap_or(AccessLevel::Maintainer),
        unprotect_level: parse_level(levels, "unprotect_access_level")?
            .unwrap_or(AccessLevel::Maintainer),
    })
}

/// Parse one optional `*_access_level` param: absent is fine, a non-number
/// is a 400, a number off the scale is a 422.
fn parse_level(levels: &Value, field: &str) -> Result<Option<AccessLevel>, DispatchError> {
    match levels.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|raw| u32::try_from(raw).ok())
            .and_then(AccessLevel::from_value)
            .map(Some)
            .ok_or_else(|| DispatchError::Unprocessable {
                field: field.to_string(),
                reason: "is not included in the list".to_string(),
            }),
        Some(_) => Err(DispatchError::BadRequest(format!(
            "{field} does not have a valid value"
        ))),
    }
}

fn rule_json(rule: &ProtectionRule) -> Value {
    json!({
        "name": rule.pattern,
        "push_access_level": rule.push_level.value(),
        "delete_access_level": rule.delete_level.value(),
        "merge_access_level": rule.merge_level.value(),
        "unprotect_access_level": rule.unprotect_level.value(),
    })
}

/// Render a client-attributable error in its conventional body shape:
/// 400s use `error`, 422s a field-keyed message map, the rest `message`.
fn render_client_error(error: DispatchError) -> ApiResponse {
    let status = error.http_status();
    match error {
        DispatchError::BadRequest(message) => ApiResponse {
            status,
            headers: Vec::new(),
            body: json!({ "error": message }),
        },
        DispatchError::Conflict(message) => ApiResponse::message(status, message),
        DispatchError::Unprocessable { field, reason } => {
            let mut errors = Map::new();
            errors.insert(field, json!([reason]));
            ApiResponse {
                status,
                headers: Vec::new(),
                body: json!({ "message": errors }),
            }
        }
        DispatchError::PreconditionFailed => ApiResponse::message(status, "412 Precondition Failed"),
    }
}
