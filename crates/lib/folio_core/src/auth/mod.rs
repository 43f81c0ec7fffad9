//! Authentication and authorization logic.
//!
//! Provides token issuance/verification, password hashing, the credential
//! store capability and identity resolution shared by `folio_api`.

pub mod identity;
pub mod jwt;
pub mod password;
pub mod queries;
pub mod store;

use thiserror::Error;

pub use identity::{Identity, IdentityResolver};
pub use jwt::{TokenConfig, TokenError, TokenService};
pub use store::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Inactive user")]
    InactiveUser,

    #[error("Duplicate credential: {0}")]
    DuplicateCredential(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
