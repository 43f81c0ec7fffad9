//! Per-request access control.

pub mod guard;

pub use guard::AccessGuard;
