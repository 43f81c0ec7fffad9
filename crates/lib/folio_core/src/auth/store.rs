// @zen-component: AUTH-CredentialStore
//
//! Credential store capability: user lookup, uniqueness-enforcing creation
//! and password verification.
//!
//! `PgCredentialStore` is the production backend; `InMemoryCredentialStore`
//! serves ephemeral development runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;

use super::{AuthError, password, queries};
use crate::models::auth::{NewUser, User, UserWithPassword};

/// Opaque user storage consumed by the auth flows.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str)
    -> Result<Option<UserWithPassword>, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, AuthError>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError>;

    /// Create an active user. Fails with `DuplicateCredential` if the username
    /// or email is already on file, leaving the store unchanged.
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AuthError>;

    /// Check a plaintext password against the user's stored hash.
    fn verify_password(&self, user: &UserWithPassword, password: &str) -> bool {
        password::verify_password(password, &user.password_hash)
    }
}

fn duplicate() -> AuthError {
    AuthError::DuplicateCredential("User with this username or email already exists".into())
}

/// PostgreSQL-backed credential store.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserWithPassword>, AuthError> {
        queries::find_user_by_username(&self.pool, username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, AuthError> {
        queries::find_user_by_email(&self.pool, email).await
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        queries::find_user_by_id(&self.pool, user_id).await
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<User, AuthError> {
        if queries::credential_exists(&self.pool, &new_user.username, &new_user.email).await? {
            return Err(duplicate());
        }
        let pw_hash = password::hash_password(&new_user.password)?;
        let user =
            queries::create_user(&self.pool, &new_user.username, &new_user.email, &pw_hash)
                .await?;
        info!(username = %user.username, user_id = %user.id, "user registered");
        Ok(user)
    }
}

/// In-memory credential store keyed by username.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, UserWithPassword>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a user's active flag. Returns `false` if the user is unknown.
    pub async fn set_active(&self, username: &str, active: bool) -> bool {
        match self.users.write().await.get_mut(username) {
            Some(entry) => {
                entry.user.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserWithPassword>, AuthError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.user.email == email)
            .cloned())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.user.id == user_id)
            .map(|u| u.user.clone()))
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<User, AuthError> {
        // Hash outside the lock; bcrypt is slow.
        let password_hash = password::hash_password(&new_user.password)?;

        let mut users = self.users.write().await;
        let taken = users.contains_key(&new_user.username)
            || users.values().any(|u| u.user.email == new_user.email);
        if taken {
            return Err(duplicate());
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        users.insert(
            user.username.clone(),
            UserWithPassword {
                user: user.clone(),
                password_hash,
            },
        );
        info!(username = %user.username, user_id = %user.id, "user registered");
        Ok(user)
    }
}
