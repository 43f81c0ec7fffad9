//! # folio_core
//!
//! Core domain logic for Folio: token issuance and verification, identity
//! resolution, the credential store and per-identity rate limiting.

pub mod auth;
pub mod books;
pub mod migrate;
pub mod models;
pub mod ratelimit;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
