//! Configuration loader with layered sources
//!
//! Loads configuration with the following precedence (highest to lowest):
//! 1. Environment variables (PORTCULLIS_*)
//! 2. Configuration file (TOML)
//! 3. Default values

use crate::config::types::AppConfig;
use crate::error::ConfigError;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "portcullis.toml",
    ".portcullis.toml",
    "~/.config/portcullis/config.toml",
    "/etc/portcullis/config.toml",
];

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. Defaults come from serde defaults on AppConfig.

    // 2. Configuration file
    if let Some(path) = config_path {
        // Explicit path provided - must exist
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(path, FileFormat::Toml));
    } else {
        // Try default paths (first existing one wins)
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // 3. Environment variables with PORTCULLIS_ prefix
    // e.g., PORTCULLIS_SERVER__PORT, PORTCULLIS_LOGGING__LEVEL
    // Double underscore (__) maps to nested keys (server.port)
    builder = builder.add_source(
        Environment::with_prefix("PORTCULLIS")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Validate configuration values
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::Invalid {
            message: "server.port must be greater than 0".to_string(),
        });
    }

    let pagination = &config.policy.pagination;
    if pagination.default_per_page == 0 || pagination.max_per_page == 0 {
        return Err(ConfigError::Invalid {
            message: "policy.pagination per_page values must be greater than 0".to_string(),
        });
    }
    if pagination.default_per_page > pagination.max_per_page {
        return Err(ConfigError::Invalid {
            message: format!(
                "policy.pagination.default_per_page ({}) exceeds max_per_page ({})",
                pagination.default_per_page, pagination.max_per_page
            ),
        });
    }

    if config.rate_limit.enabled {
        if config.rate_limit.limit == 0 {
            return Err(ConfigError::Invalid {
                message: "rate_limit.limit must be greater than 0 when enabled".to_string(),
            });
        }
        if config.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "rate_limit.window_secs must be greater than 0 when enabled".to_string(),
            });
        }
    }

    if let Some(path) = &config.fixtures
        && path.is_empty()
    {
        return Err(ConfigError::Missing {
            field: "fixtures".to_string(),
        });
    }

    Ok(())
}
