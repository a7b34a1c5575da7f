//! Role and membership resolution
//!
//! Computes a principal's effective access level over a resource by walking
//! every grant path (direct membership, ancestor namespaces, group links)
//! and max-reducing, and enumerates deduplicated member lists.

mod resolver;
mod types;

pub use resolver::{EffectiveMember, MembershipResolver};
pub use types::{AccessLevel, GroupLink, Membership, MembershipState, MembershipTarget};
