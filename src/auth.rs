//! Auth-domain identifiers, claims, and issued token models.

pub mod claims;
pub mod id;
pub mod token;

pub use claims::*;
pub use id::*;
pub use token::{issued::*, kind::*, secret::*};
