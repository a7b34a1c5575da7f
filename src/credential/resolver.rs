//! Credential resolver
//!
//! Resolves raw request material into a principal. Precedence:
//! 1. Explicit token slots (bearer / private-token / job-token); more than
//!    one populated is ambiguous and rejected.
//! 2. Basic-auth pair (deploy token or session), only when no explicit token
//!    is present.
//! 3. Nothing at all resolves to no principal, which callers map to 401
//!    except where anonymous access is itself permitted.
//!
//! An unknown token is *not* a rejection: it resolves to `NoPrincipal`.
//! Revoked and expired credentials reject with distinct errors (both 401 at
//! the boundary); a blocked owner rejects with the single 403-mapped variant.

use crate::credential::types::CredentialMaterial;
use crate::error::{CredentialError, StoreError};
use crate::model::Principal;
use crate::store::{CredentialRecord, CredentialStore};
use crate::util::SecretString;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Outcome of credential resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Material resolved to a live principal.
    Principal(Principal),
    /// No material supplied, or the token matched no stored credential.
    NoPrincipal,
    /// Material matched a stored credential that must be refused.
    Rejected(CredentialError),
}

impl Resolution {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Resolution::Principal(p) => Some(p),
            _ => None,
        }
    }
}

/// Resolves request credential material against the credential store.
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Resolve material into a principal.
    ///
    /// `now` is epoch seconds, passed in rather than read from the clock so
    /// expiry decisions are deterministic under test.
    pub async fn resolve(
        &self,
        material: &CredentialMaterial,
        now: u64,
    ) -> Result<Resolution, StoreError> {
        if material.is_empty() {
            trace!("No credential material; anonymous request");
            return Ok(Resolution::NoPrincipal);
        }

        if material.explicit_token_count() > 1 {
            debug!("Multiple explicit token slots populated");
            return Ok(Resolution::Rejected(CredentialError::Ambiguous));
        }

        let record = if let Some(token) = explicit_token(material) {
            self.store.lookup_token(token.expose_secret()).await?
        } else if let Some((username, secret)) = &material.basic {
            self.store
                .lookup_basic(username, secret.expose_secret())
                .await?
        } else {
            None
        };

        let Some(record) = record else {
            // Unknown token: indistinguishable from no credential by design;
            // the caller decides whether anonymous access suffices.
            debug!("Credential material matched no stored record");
            return Ok(Resolution::NoPrincipal);
        };

        Ok(self.admit(record, now))
    }

    /// Validate a matched record and build its principal.
    fn admit(&self, record: CredentialRecord, now: u64) -> Resolution {
        if record.revoked {
            warn!(credential = record.id, kind = %record.kind, "Revoked credential presented");
            return Resolution::Rejected(CredentialError::Revoked);
        }

        if let Some(expires_at) = record.expires_at
            && expires_at <= now
        {
            warn!(credential = record.id, kind = %record.kind, "Expired credential presented");
            return Resolution::Rejected(CredentialError::Expired);
        }

        if record.owner_blocked {
            warn!(credential = record.id, owner = record.owner_id, "Blocked principal");
            return Resolution::Rejected(CredentialError::BlockedPrincipal);
        }

        // Last-used touch is fire-and-forget; the store swallows failures.
        self.store.touch_last_used(record.id);

        let principal = Principal {
            id: record.owner_id,
            kind: record.owner_kind,
            scopes: record.kind.effective_scopes(&record.scopes),
            admin_mode: record.admin_mode,
        };

        debug!(
            principal = principal.id,
            kind = ?principal.kind,
            credential_kind = %record.kind,
            "Resolved principal"
        );

        Resolution::Principal(principal)
    }
}

fn explicit_token(material: &CredentialMaterial) -> Option<&SecretString> {
    material
        .private_token
        .as_ref()
        .or(material.bearer.as_ref())
        .or(material.job_token.as_ref())
}
