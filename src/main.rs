//! Portcullis API server
//!
//! A permission-gated REST API engine over an in-memory backing store.

use clap::Parser;
use portcullis::config::{LogFormat, load_config};
use portcullis::dispatch::Dispatcher;
use portcullis::store::{
    FixedWindowLimiter, InMemoryStore, JobTrigger, NoopJobTrigger, NoopRateLimiter, RateLimiter,
};
use portcullis::transport::{DEFAULT_HTTP_PORT, HttpConfig, run_http};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Portcullis - permission-gated REST API engine
#[derive(Parser, Debug)]
#[command(name = "portcullis")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PORTCULLIS_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PORTCULLIS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// HTTP server host
    #[arg(long, env = "PORTCULLIS_HTTP_HOST", default_value = "127.0.0.1")]
    http_host: String,

    /// HTTP server port
    #[arg(long, env = "PORTCULLIS_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Path to a TOML fixture file seeding the store (overrides config)
    #[arg(long, env = "PORTCULLIS_FIXTURES")]
    fixtures: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration before logging so the configured format applies,
    // with the CLI log level as the filter fallback.
    let config = load_config(args.config.as_deref())?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match config.logging.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting portcullis");

    // Seed the store from fixtures if any were given.
    let fixtures = args.fixtures.as_ref().or(config.fixtures.as_ref());
    let store = match fixtures {
        Some(path) => {
            info!(path = %path, "Loading fixtures");
            Arc::new(
                InMemoryStore::from_fixture_file(path)
                    .inspect_err(|e| error!(error = %e, "Failed to load fixtures"))?,
            )
        }
        None => Arc::new(InMemoryStore::new()),
    };

    let limiter: Arc<dyn RateLimiter> = if config.rate_limit.enabled {
        Arc::new(FixedWindowLimiter::new(
            config.rate_limit.limit,
            config.rate_limit.window_secs,
        ))
    } else {
        Arc::new(NoopRateLimiter)
    };
    let jobs: Arc<dyn JobTrigger> = Arc::new(NoopJobTrigger);

    let dispatcher = Arc::new(Dispatcher::new(
        store,
        config.policy.clone(),
        limiter,
        jobs,
    ));

    let http_config = HttpConfig::from_host_port(&args.http_host, args.http_port)?;

    run_http(dispatcher, http_config).await?;

    Ok(())
}
