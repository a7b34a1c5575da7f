//! Secret string type for raw token material.
//!
//! Every place the crate holds a token value (credential records, inbound
//! request material) uses this wrapper so the value cannot leak through
//! `Debug`/`Display` formatting or tracing fields.

use serde::Deserialize;
use std::fmt;

/// A string wrapper whose `Debug` and `Display` render `[REDACTED]`.
///
/// Call [`expose_secret`](SecretString::expose_secret) at the single point
/// where the raw value is actually compared against the credential store.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Explicitly expose the secret value.
    #[inline]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        // Best-effort memory clearing; the compiler may optimize this away.
        self.0.clear();
        self.0.shrink_to_fit();
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redacted() {
        let secret = SecretString::new("glpat-abc123");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_expose_secret() {
        let secret = SecretString::new("glpat-abc123");
        assert_eq!(secret.expose_secret(), "glpat-abc123");
    }

    #[test]
    fn test_deserialize() {
        let secret: SecretString = serde_json::from_str(r#""deploy-token-1""#).unwrap();
        assert_eq!(secret.expose_secret(), "deploy-token-1");
    }
}
