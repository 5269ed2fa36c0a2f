//! Identity-provider settings (data) and profile exchange (behavior).
//!
//! `settings` holds validated per-provider endpoints and client credentials, `registry` maps
//! provider names to them, and `profile` turns an authorization code into a provider profile.

pub mod profile;
pub mod registry;
pub mod settings;

pub use profile::*;
pub use registry::*;
pub use settings::*;
