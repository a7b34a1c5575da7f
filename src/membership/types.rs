//! Membership types
//!
//! The access-level scale and the grant records the resolver walks.

use crate::model::{NamespaceId, PrincipalId, ResourceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered access-level scale.
///
/// Numeric values match the conventional 0..60 scale so fixtures and API
/// payloads can use the familiar integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    NoAccess,
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
    Admin,
}

impl AccessLevel {
    /// Numeric value used in API payloads and fixtures.
    pub const fn value(&self) -> u32 {
        match self {
            AccessLevel::NoAccess => 0,
            AccessLevel::Guest => 10,
            AccessLevel::Reporter => 20,
            AccessLevel::Developer => 30,
            AccessLevel::Maintainer => 40,
            AccessLevel::Owner => 50,
            AccessLevel::Admin => 60,
        }
    }

    /// Parse a numeric access level. Admin (60) is never assignable through
    /// the API, so it is rejected here.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(AccessLevel::NoAccess),
            10 => Some(AccessLevel::Guest),
            20 => Some(AccessLevel::Reporter),
            30 => Some(AccessLevel::Developer),
            40 => Some(AccessLevel::Maintainer),
            50 => Some(AccessLevel::Owner),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::NoAccess => "no_access",
            AccessLevel::Guest => "guest",
            AccessLevel::Reporter => "reporter",
            AccessLevel::Developer => "developer",
            AccessLevel::Maintainer => "maintainer",
            AccessLevel::Owner => "owner",
            AccessLevel::Admin => "admin",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a membership grant attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipTarget {
    Resource(ResourceId),
    Namespace(NamespaceId),
}

/// Membership lifecycle state. A pending access request grants nothing until
/// approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    #[default]
    Active,
    AwaitingApproval,
}

/// A single grant path relating a principal to a resource or namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub principal_id: PrincipalId,
    pub target: MembershipTarget,
    pub level: AccessLevel,
    #[serde(default)]
    pub state: MembershipState,
    /// Epoch seconds of the last modification; consulted for conditional
    /// (If-Unmodified-Since) mutations.
    #[serde(default)]
    pub updated_at: u64,
}

impl Membership {
    pub fn grants_access(&self) -> bool {
        self.state == MembershipState::Active && self.level > AccessLevel::NoAccess
    }
}

/// A share from another group into a namespace, capped at `max_level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLink {
    /// Group whose members gain access
    pub source_group: NamespaceId,
    /// Namespace being shared into
    pub shared_namespace: NamespaceId,
    /// Ceiling applied to levels granted through this link
    pub max_level: AccessLevel,
}
