//! HTTP transport
//!
//! Maps the REST surface onto the dispatcher: route and header extraction
//! on the way in, status/header/body rendering on the way out.

mod http;

pub use http::{DEFAULT_HTTP_PORT, HttpConfig, build_router, run_http};
