//! Error types for portcullis
//!
//! This module defines the error hierarchy used throughout the crate.
//! We use `thiserror` for library-style errors that are part of the API and
//! convert to HTTP responses at the dispatch boundary.
//!
//! Expected denial outcomes (forbidden, not found, unauthorized) are *not*
//! errors: the decision engine returns them as [`Verdict`](crate::authz::Verdict)
//! values. Only infrastructure failures and unparseable input raise here.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Invalid protection pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credential resolution failures.
///
/// `Revoked` and `Expired` are distinct variants so logs can tell them apart,
/// but both surface as 401 at the HTTP boundary. `Blocked` is the one
/// resolver failure that maps to 403: the token itself is valid, its owner
/// is not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Multiple conflicting credentials supplied")]
    Ambiguous,

    #[error("Credential owner is blocked")]
    BlockedPrincipal,

    #[error("Credential has been revoked")]
    Revoked,

    #[error("Credential has expired")]
    Expired,

    #[error("Malformed credential material: {0}")]
    Malformed(String),
}

impl CredentialError {
    /// HTTP status this failure maps to at the boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            CredentialError::BlockedPrincipal => 403,
            _ => 401,
        }
    }
}

/// Backing-store failures. Always mapped to 500 and logged; the client only
/// ever sees a generic wrapper message.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dispatch-level request errors (client-attributable).
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {field} {reason}")]
    Unprocessable { field: String, reason: String },

    #[error("Precondition failed")]
    PreconditionFailed,
}

impl DispatchError {
    pub fn http_status(&self) -> u16 {
        match self {
            DispatchError::BadRequest(_) => 400,
            DispatchError::Conflict(_) => 409,
            DispatchError::Unprocessable { .. } => 422,
            DispatchError::PreconditionFailed => 412,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_error_statuses() {
        assert_eq!(CredentialError::Ambiguous.http_status(), 401);
        assert_eq!(CredentialError::Revoked.http_status(), 401);
        assert_eq!(CredentialError::Expired.http_status(), 401);
        assert_eq!(CredentialError::BlockedPrincipal.http_status(), 403);
        assert_eq!(
            CredentialError::Malformed("garbage".into()).http_status(),
            401
        );
    }

    #[test]
    fn test_dispatch_error_statuses() {
        assert_eq!(DispatchError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(DispatchError::Conflict("x".into()).http_status(), 409);
        assert_eq!(
            DispatchError::Unprocessable {
                field: "access_level".into(),
                reason: "is invalid".into()
            }
            .http_status(),
            422
        );
        assert_eq!(DispatchError::PreconditionFailed.http_status(), 412);
    }

    #[test]
    fn test_revoked_and_expired_are_distinct() {
        // Same HTTP effect, different variants for logging.
        assert_ne!(CredentialError::Revoked, CredentialError::Expired);
        assert_eq!(
            CredentialError::Revoked.http_status(),
            CredentialError::Expired.http_status()
        );
    }
}
