//! Small shared utilities

mod secret;

pub use secret::SecretString;
