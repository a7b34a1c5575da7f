//! Credential resolution
//!
//! Turns raw request material (token headers, basic-auth pairs) into a
//! [`Principal`](crate::model::Principal), or establishes that no principal
//! could be resolved.

mod resolver;
mod types;

pub use resolver::{CredentialResolver, Resolution};
pub use types::{CredentialKind, CredentialMaterial};
