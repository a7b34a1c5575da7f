//! Portcullis
//!
//! A permission-gated REST API engine: every operation on a resource's
//! sub-collections (badges, branches, members, packages) passes through
//! credential resolution, role and membership resolution, visibility and
//! feature gates, and protection rules before it touches data.
//!
//! ## Decision model
//!
//! ```text
//! credentials → principal → effective access level → verdict → execution
//! ```
//!
//! - **Denials are values, not errors.** The engine returns a
//!   [`Verdict`](authz::Verdict); only infrastructure failures raise.
//! - **Absence and no-access are indistinguishable.** Principals without
//!   read access to a private resource see the same 404 whether or not the
//!   resource exists.
//! - **Effective level is a max-reduction** over every grant path: direct
//!   membership, ancestor namespaces, and group links (capped at the link's
//!   maximum level).
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 18080
//!
//! [policy.member_denial_overrides]
//! packages = "not_found"      # members lacking role get 404, not 403
//!
//! [rate_limit]
//! enabled = true
//! limit = 6
//! window_secs = 60
//!
//! fixtures = "fixtures/demo.toml"
//! ```

pub mod authz;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod membership;
pub mod model;
pub mod projection;
pub mod store;
pub mod transport;
pub mod util;

// Re-export main types
pub use authz::{AuthorizationEngine, Verdict};
pub use config::{AppConfig, load_config};
pub use dispatch::{ApiRequest, ApiResponse, Dispatcher, Operation};
pub use store::InMemoryStore;
