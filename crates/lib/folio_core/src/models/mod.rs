//! Domain models shared across the Folio crates.

pub mod auth;
pub mod books;
