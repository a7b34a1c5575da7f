//! Configuration handling
//!
//! Layered configuration (defaults, TOML file, environment variables) plus
//! the [`PolicyConfig`] value object passed into the decision engine at call
//! time. Nothing in the engine reads ambient globals; deterministic tests
//! construct a `PolicyConfig` directly.

mod loader;
mod types;

pub use loader::{load_config, load_config_from_str};
pub use types::{
    AppConfig, DenialStyle, LogFormat, LoggingConfig, PaginationConfig, PolicyConfig,
    RateLimitConfig, ServerConfig,
};
