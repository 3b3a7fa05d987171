//! Bearer token record and secret wrapper.

pub mod record;
pub mod secret;
