//! Credential types
//!
//! The closed set of credential kinds and the raw material extracted from a
//! request. Each kind carries its own scope-resolution rule, dispatched via
//! pattern match in [`effective_scopes`](CredentialKind::effective_scopes).

use crate::model::Scope;
use crate::util::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Closed set of credential kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    PersonalAccessToken,
    OAuthToken,
    DeployToken,
    CiJobToken,
    Session,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::PersonalAccessToken => "personal_access_token",
            CredentialKind::OAuthToken => "oauth_token",
            CredentialKind::DeployToken => "deploy_token",
            CredentialKind::CiJobToken => "ci_job_token",
            CredentialKind::Session => "session",
        }
    }

    /// Scopes this credential actually confers given its stored scope set.
    ///
    /// Deploy tokens can only ever reach the registry scopes no matter what
    /// is stored; CI job tokens are capped at plain API access; sessions
    /// carry full API access implicitly.
    pub fn effective_scopes(&self, stored: &BTreeSet<Scope>) -> BTreeSet<Scope> {
        match self {
            CredentialKind::PersonalAccessToken | CredentialKind::OAuthToken => stored.clone(),
            CredentialKind::DeployToken => stored
                .iter()
                .copied()
                .filter(|s| matches!(s, Scope::ReadRegistry | Scope::WriteRegistry))
                .collect(),
            CredentialKind::CiJobToken => stored
                .iter()
                .copied()
                .filter(|s| matches!(s, Scope::Api | Scope::ReadApi))
                .collect(),
            CredentialKind::Session => BTreeSet::from([Scope::Api]),
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw credential material extracted from an inbound request.
///
/// At most one slot is honored per request; see the resolver for the
/// precedence rules.
#[derive(Debug, Clone, Default)]
pub struct CredentialMaterial {
    /// `Authorization: Bearer <token>`
    pub bearer: Option<SecretString>,
    /// `PRIVATE-TOKEN` header or `private_token` param
    pub private_token: Option<SecretString>,
    /// `JOB-TOKEN` header or `job_token` param
    pub job_token: Option<SecretString>,
    /// `Authorization: Basic` pair (deploy token or session)
    pub basic: Option<(String, SecretString)>,
}

impl CredentialMaterial {
    /// Material carrying nothing at all (anonymous request).
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_private_token(token: impl Into<String>) -> Self {
        Self {
            private_token: Some(SecretString::new(token)),
            ..Self::default()
        }
    }

    pub fn from_bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(SecretString::new(token)),
            ..Self::default()
        }
    }

    pub fn from_job_token(token: impl Into<String>) -> Self {
        Self {
            job_token: Some(SecretString::new(token)),
            ..Self::default()
        }
    }

    pub fn from_basic(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            basic: Some((username.into(), SecretString::new(secret))),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bearer.is_none()
            && self.private_token.is_none()
            && self.job_token.is_none()
            && self.basic.is_none()
    }

    /// Number of explicit token slots populated (excludes basic-auth, which
    /// loses to any explicit token header rather than conflicting with it).
    pub fn explicit_token_count(&self) -> usize {
        [
            self.bearer.is_some(),
            self.private_token.is_some(),
            self.job_token.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}
