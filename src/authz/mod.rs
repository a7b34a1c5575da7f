//! Authorization decision engine
//!
//! Combines credential scopes, membership levels, visibility and feature
//! gates, and protection rules into a single [`Verdict`] per request.
//! Denials are values, never errors.

pub mod engine;
pub mod protection;
pub mod visibility;

pub use engine::{Action, ActionRequest, AuthorizationEngine};
pub use protection::{ProtectedAction, ProtectionRule, RuleMatcher};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation class for determining read vs write access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Read operations (get, list)
    Read,
    /// Write operations (create, update)
    Write,
    /// Delete operations
    Delete,
    /// Execute operations (merge, retry, protect)
    Execute,
}

impl OperationType {
    pub const fn is_read_only(&self) -> bool {
        matches!(self, OperationType::Read)
    }

    pub const fn is_mutating(&self) -> bool {
        !self.is_read_only()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationType::Read => "read",
            OperationType::Write => "write",
            OperationType::Delete => "delete",
            OperationType::Execute => "execute",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The engine's output for one action request. Produced once, immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// No principal resolved where one is required (401)
    Unauthorized,
    /// Authenticated but insufficient role/scope, protection-rule violation,
    /// or disabled feature encountered by a member (403)
    Forbidden { message: String },
    /// Resource absent, or hidden from this principal by design (404)
    NotFound { message: String },
    /// Rate limiter short-circuit (429)
    TooManyRequests,
}

impl Verdict {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Verdict::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Verdict::NotFound {
            message: message.into(),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Verdict::Allow => 200,
            Verdict::Unauthorized => 401,
            Verdict::Forbidden { .. } => 403,
            Verdict::NotFound { .. } => 404,
            Verdict::TooManyRequests => 429,
        }
    }

    /// Human-readable message for the response body.
    pub fn message(&self) -> String {
        match self {
            Verdict::Allow => "OK".to_string(),
            Verdict::Unauthorized => "401 Unauthorized".to_string(),
            Verdict::Forbidden { message } => message.clone(),
            Verdict::NotFound { message } => message.clone(),
            Verdict::TooManyRequests => "429 Too Many Requests".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_classes() {
        assert!(OperationType::Read.is_read_only());
        assert!(!OperationType::Read.is_mutating());
        assert!(OperationType::Write.is_mutating());
        assert!(OperationType::Delete.is_mutating());
        assert!(OperationType::Execute.is_mutating());
    }

    #[test]
    fn test_verdict_statuses() {
        assert_eq!(Verdict::Allow.http_status(), 200);
        assert_eq!(Verdict::Unauthorized.http_status(), 401);
        assert_eq!(Verdict::forbidden("403 Forbidden").http_status(), 403);
        assert_eq!(
            Verdict::not_found("404 Project Not Found").http_status(),
            404
        );
        assert_eq!(Verdict::TooManyRequests.http_status(), 429);
    }

    #[test]
    fn test_verdict_messages() {
        assert_eq!(
            Verdict::not_found("404 Project Not Found").message(),
            "404 Project Not Found"
        );
        assert_eq!(Verdict::Unauthorized.message(), "401 Unauthorized");
    }
}
