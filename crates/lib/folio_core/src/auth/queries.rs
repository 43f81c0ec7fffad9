//! Auth-related database queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::AuthError;
use crate::models::auth::{User, UserWithPassword};

type UserRow = (String, String, String, String, bool, DateTime<Utc>);

const USER_COLUMNS: &str = "id::text, username, email, password_hash, is_active, created_at";

fn into_user(row: UserRow) -> UserWithPassword {
    let (id, username, email, password_hash, is_active, created_at) = row;
    UserWithPassword {
        user: User {
            id,
            username,
            email,
            is_active,
            created_at,
        },
        password_hash,
    }
}

/// Fetch a user (with password hash) by username.
pub async fn find_user_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<UserWithPassword>, AuthError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_user))
}

/// Fetch a user (with password hash) by email.
pub async fn find_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserWithPassword>, AuthError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_user))
}

/// Fetch a user by ID.
pub async fn find_user_by_id(pool: &PgPool, user_id: &str) -> Result<Option<User>, AuthError> {
    if uuid::Uuid::parse_str(user_id).is_err() {
        return Ok(None);
    }
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1::uuid"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| into_user(r).user))
}

/// Check whether a username or email is already registered.
pub async fn credential_exists(
    pool: &PgPool,
    username: &str,
    email: &str,
) -> Result<bool, AuthError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
    )
    .bind(username)
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Insert a new active user.
///
/// A unique-constraint violation (a concurrent registration won the race)
/// surfaces as `DuplicateCredential`, never as a partial insert.
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User, AuthError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::DuplicateCredential(
            "User with this username or email already exists".into(),
        ),
        other => AuthError::DbError(other),
    })?;
    Ok(into_user(row).user)
}
