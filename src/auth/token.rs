//! Token kinds, redacted secrets, and issued token artifacts.

pub mod issued;
pub mod kind;
pub mod secret;
