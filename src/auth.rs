//! Token models: bearer records, redacted secrets, and granted scopes.

pub mod scope;
pub mod token;

pub use scope::*;
pub use token::{record::*, secret::*};
