//! Core domain model
//!
//! Principals, resources, visibility levels and per-feature gates. These are
//! the inputs every resolver and the decision engine operate on; none of them
//! carry behavior beyond small accessors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier types. Plain newtype-free u64s keep fixtures and tests terse.
pub type PrincipalId = u64;
pub type ResourceId = u64;
pub type NamespaceId = u64;

/// Kind of actor issuing a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Anonymous,
    User,
    Admin,
    DeployToken,
    CiJob,
}

/// Capability scope attached to a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Api,
    ReadApi,
    Sudo,
    ReadRegistry,
    WriteRegistry,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Api => "api",
            Scope::ReadApi => "read_api",
            Scope::Sudo => "sudo",
            Scope::ReadRegistry => "read_package_registry",
            Scope::WriteRegistry => "write_package_registry",
        }
    }

    pub fn try_parse(s: &str) -> Option<Self> {
        match s {
            "api" => Some(Scope::Api),
            "read_api" => Some(Scope::ReadApi),
            "sudo" => Some(Scope::Sudo),
            "read_package_registry" => Some(Scope::ReadRegistry),
            "write_package_registry" => Some(Scope::WriteRegistry),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The actor a credential resolved to (or the anonymous actor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    #[serde(default)]
    pub scopes: BTreeSet<Scope>,
    /// Admins only bypass role checks for mutations while admin mode is on.
    #[serde(default)]
    pub admin_mode: bool,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            id: 0,
            kind: PrincipalKind::Anonymous,
            scopes: BTreeSet::new(),
            admin_mode: false,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.kind == PrincipalKind::Anonymous
    }

    pub fn is_admin(&self) -> bool {
        self.kind == PrincipalKind::Admin
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// Resource-level visibility setting
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Internal,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Internal => "internal",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-capability feature whose access level can diverge from the resource's
/// overall visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Repository,
    PackageRegistry,
    Builds,
    Snippets,
    Wiki,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Repository => "repository",
            Feature::PackageRegistry => "package_registry",
            Feature::Builds => "builds",
            Feature::Snippets => "snippets",
            Feature::Wiki => "wiki",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Access level override for a single feature.
///
/// `Public` permits anonymous reads of that feature even on an otherwise
/// private resource; `Disabled` shuts the feature off even on a public one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureAccessLevel {
    Disabled,
    Private,
    #[default]
    Enabled,
    Public,
}

/// Kind of protectable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Project,
    Group,
}

/// A protectable entity (project or group) and its gate-relevant attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    /// Full path, e.g. `gitlab-org/gitlab-test`
    pub path: String,
    pub visibility: Visibility,
    /// Namespace this resource belongs to, innermost first. Walked for
    /// inherited memberships.
    #[serde(default)]
    pub namespace_chain: Vec<NamespaceId>,
    /// Per-feature overrides; features absent here default to `Enabled`.
    #[serde(default)]
    pub feature_levels: Vec<(Feature, FeatureAccessLevel)>,
}

impl Resource {
    pub fn feature_level(&self, feature: Feature) -> FeatureAccessLevel {
        self.feature_levels
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, level)| *level)
            .unwrap_or_default()
    }

    /// Human-readable type name used in "404 X Not Found" messages.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ResourceKind::Project => "Project",
            ResourceKind::Group => "Group",
        }
    }
}
