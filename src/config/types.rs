//! Configuration types for portcullis
//!
//! These structures are loaded from TOML files and/or environment variables.
//! `PolicyConfig` doubles as the explicit configuration value object handed
//! to the authorization engine on every call.

use serde::Deserialize;
use std::collections::HashMap;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Authorization policy knobs
    pub policy: PolicyConfig,

    /// Rate limiting
    pub rate_limit: RateLimitConfig,

    /// Path to a TOML fixture file seeding the in-memory store
    pub fixtures: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18080,
            name: "portcullis".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Status code style for denying an authenticated-but-under-privileged
/// principal on a private resource.
///
/// The dominant pattern is 403 for authenticated members lacking role and
/// 404 for complete non-members, but individual endpoints historically
/// deviate; those deviations are policy, not code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialStyle {
    /// Hide the resource entirely (404)
    #[default]
    NotFound,
    /// Admit existence but refuse (403)
    Forbidden,
}

/// Authorization policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Denial style for under-privileged members of private resources,
    /// keyed by endpoint name (e.g. "branches", "members"). Endpoints not
    /// listed use the default member style (forbidden).
    pub member_denial_overrides: HashMap<String, DenialStyle>,

    /// Pagination bounds
    pub pagination: PaginationConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            member_denial_overrides: HashMap::new(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl PolicyConfig {
    /// Denial style for an authenticated member lacking sufficient role on
    /// the given endpoint. Non-members of private resources always get
    /// `NotFound` regardless of this setting.
    pub fn member_denial_style(&self, endpoint: &str) -> DenialStyle {
        self.member_denial_overrides
            .get(endpoint)
            .copied()
            .unwrap_or(DenialStyle::Forbidden)
    }
}

/// Pagination defaults and caps
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests allowed per key per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: 6,
            window_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 18080);
        assert_eq!(config.policy.pagination.default_per_page, 20);
        assert_eq!(config.policy.pagination.max_per_page, 100);
        assert!(!config.rate_limit.enabled);
    }

    #[test]
    fn test_member_denial_style_default() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.member_denial_style("branches"), DenialStyle::Forbidden);
    }

    #[test]
    fn test_member_denial_style_override() {
        let mut policy = PolicyConfig::default();
        policy
            .member_denial_overrides
            .insert("packages".to_string(), DenialStyle::NotFound);
        assert_eq!(policy.member_denial_style("packages"), DenialStyle::NotFound);
        assert_eq!(policy.member_denial_style("members"), DenialStyle::Forbidden);
    }

    #[test]
    fn test_deserialize_denial_style() {
        let style: DenialStyle = serde_json::from_str(r#""not_found""#).unwrap();
        assert_eq!(style, DenialStyle::NotFound);
        let style: DenialStyle = serde_json::from_str(r#""forbidden""#).unwrap();
        assert_eq!(style, DenialStyle::Forbidden);
    }
}
