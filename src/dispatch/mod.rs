//! Request dispatch
//!
//! Transport-neutral request/response types and the [`Dispatcher`] that
//! chains credential resolution, authorization and execution. The HTTP
//! layer builds an [`ApiRequest`] from the wire and renders the
//! [`ApiResponse`] back; everything in between lives here so it can be
//! driven directly in tests.

mod dispatcher;

pub use dispatcher::Dispatcher;

use crate::authz::Verdict;
use crate::credential::CredentialMaterial;
use crate::model::{PrincipalId, ResourceId};
use serde_json::{Value, json};
use std::time::{SystemTime, UNIX_EPOCH};

/// Every operation the API exposes, with its parsed path parameters.
/// Body and query parameters that need validation stay as raw JSON and are
/// checked by the dispatcher, so malformed input produces the right status
/// instead of a transport-level parse failure.
#[derive(Debug, Clone)]
pub enum Operation {
    ListBadges {
        resource: ResourceId,
    },
    CreateBadge {
        resource: ResourceId,
        name: String,
        fields: Value,
    },
    ListBranches {
        resource: ResourceId,
    },
    GetBranch {
        resource: ResourceId,
        name: String,
    },
    DeleteBranch {
        resource: ResourceId,
        name: String,
    },
    ListProtectedBranches {
        resource: ResourceId,
    },
    /// Idempotent: re-protecting an already-protected pattern succeeds,
    /// with last-write-wins on conflicting thresholds.
    ProtectBranch {
        resource: ResourceId,
        pattern: String,
        /// Raw `*_access_level` params, validated by the dispatcher
        levels: Value,
    },
    /// Idempotent: unprotecting an unprotected pattern succeeds.
    UnprotectBranch {
        resource: ResourceId,
        pattern: String,
    },
    ListMembers {
        resource: ResourceId,
        /// `/members/all`: include inherited and linked grants
        include_inherited: bool,
    },
    AddMember {
        resource: ResourceId,
        /// Raw param: non-numeric is a 400
        user_id: Value,
        /// Raw param: non-numeric is a 400, unknown numeric a 422
        access_level: Value,
    },
    UpdateMember {
        resource: ResourceId,
        user_id: PrincipalId,
        /// Raw param: non-numeric is a 400, unknown numeric a 422
        access_level: Value,
    },
    RemoveMember {
        resource: ResourceId,
        user_id: PrincipalId,
    },
    ListPackages {
        resource: ResourceId,
    },
}

impl Operation {
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Operation::ListBadges { resource }
            | Operation::CreateBadge { resource, .. }
            | Operation::ListBranches { resource }
            | Operation::GetBranch { resource, .. }
            | Operation::DeleteBranch { resource, .. }
            | Operation::ListProtectedBranches { resource }
            | Operation::ProtectBranch { resource, .. }
            | Operation::UnprotectBranch { resource, .. }
            | Operation::ListMembers { resource, .. }
            | Operation::AddMember { resource, .. }
            | Operation::UpdateMember { resource, .. }
            | Operation::RemoveMember { resource, .. }
            | Operation::ListPackages { resource } => *resource,
        }
    }
}

/// Raw list-shaping query parameters, validated by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub order_by: Option<String>,
    pub sort: Option<String>,
}

/// One inbound API call, transport already stripped away.
#[derive(Debug)]
pub struct ApiRequest {
    pub operation: Operation,
    pub credentials: CredentialMaterial,
    pub list: ListParams,
    /// Epoch seconds from an `If-Unmodified-Since` header, if present
    pub if_unmodified_since: Option<u64>,
    /// Epoch seconds the request arrived; injectable so expiry and
    /// timestamp behavior is deterministic under test
    pub now: u64,
}

impl ApiRequest {
    pub fn new(operation: Operation, credentials: CredentialMaterial) -> Self {
        Self {
            operation,
            credentials,
            list: ListParams::default(),
            if_unmodified_since: None,
            now: epoch_now(),
        }
    }
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One outbound API response, ready for the transport to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    pub fn created(body: Value) -> Self {
        Self {
            status: 201,
            headers: Vec::new(),
            body,
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            headers: Vec::new(),
            body: Value::Null,
        }
    }

    pub fn message(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: json!({ "message": message.into() }),
        }
    }

    pub fn from_verdict(verdict: &Verdict) -> Self {
        Self::message(verdict.http_status(), verdict.message())
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}
