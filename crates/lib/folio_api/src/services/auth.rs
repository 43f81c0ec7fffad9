// @zen-component: AUTH-CredentialService
//
//! Registration, login and refresh flows over a [`CredentialStore`] and
//! [`TokenService`].

use folio_core::auth::{AuthError, CredentialStore, TokenService};
use folio_core::models::auth::{NewUser, TokenKind, User};
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::{RegisterRequest, TokenResponse, UserResponse};

fn validate_registration(req: &RegisterRequest) -> Result<(), AuthError> {
    if req.username.trim().is_empty() {
        return Err(AuthError::ValidationError("username must not be empty".into()));
    }
    if !req.email.contains('@') {
        return Err(AuthError::ValidationError("email must be a valid address".into()));
    }
    if req.password.is_empty() {
        return Err(AuthError::ValidationError("password must not be empty".into()));
    }
    Ok(())
}

/// Create an account. Duplicate usernames or emails leave the store unchanged.
pub async fn register(store: &dyn CredentialStore, req: &RegisterRequest) -> AppResult<UserResponse> {
    validate_registration(req)?;
    let user = store
        .create_user(&NewUser {
            username: req.username.trim().to_string(),
            email: req.email.trim().to_string(),
            password: req.password.clone(),
        })
        .await?;
    Ok(user.into())
}

/// Exchange a username and password for an access/refresh pair.
pub async fn login(
    store: &dyn CredentialStore,
    tokens: &TokenService,
    username: &str,
    password: &str,
) -> AppResult<TokenResponse> {
    let found = store.find_by_username(username).await.map_err(|e| {
        debug!(error = %e, "credential lookup failed during login");
        AuthError::CredentialError
    })?;
    let entry = match found {
        Some(entry) if store.verify_password(&entry, password) => entry,
        _ => return Err(AuthError::CredentialError.into()),
    };
    if !entry.user.is_active {
        return Err(AuthError::InactiveUser.into());
    }

    let access = tokens.issue_access(&entry.user.username).map_err(AuthError::from)?;
    let refresh = tokens.issue_refresh(&entry.user.username).map_err(AuthError::from)?;
    info!(username = %entry.user.username, "login succeeded");
    Ok(TokenResponse::bearer(access, refresh))
}

/// Mint a new access token from a refresh token. The refresh token itself is
/// returned unchanged.
pub async fn refresh(
    store: &dyn CredentialStore,
    tokens: &TokenService,
    refresh_token: &str,
) -> AppResult<TokenResponse> {
    let username = tokens
        .verify(refresh_token, TokenKind::Refresh)
        .map_err(AuthError::from)?;

    let found = store.find_by_username(&username).await.map_err(|e| {
        debug!(error = %e, "credential lookup failed during refresh");
        AuthError::Unauthenticated("Could not validate credentials".into())
    })?;
    match found {
        Some(entry) if entry.user.is_active => {}
        _ => {
            return Err(AuthError::Unauthenticated("User not found or inactive".into()).into());
        }
    }

    let access = tokens.issue_access(&username).map_err(AuthError::from)?;
    Ok(TokenResponse::bearer(access, refresh_token.to_string()))
}

/// Profile of the resolved caller.
pub fn me(user: User) -> UserResponse {
    user.into()
}

#[cfg(test)]
mod tests {
    use folio_core::auth::{InMemoryCredentialStore, TokenConfig};

    use super::*;
    use crate::error::AppError;

    fn request(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "hunter2".into(),
        }
    }

    fn tokens() -> TokenService {
        TokenService::new(&TokenConfig::new("service-secret"))
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = InMemoryCredentialStore::new();
        let user = register(&store, &request("carol", "carol@example.com"))
            .await
            .unwrap();
        assert!(user.is_active);

        let svc = tokens();
        let pair = login(&store, &svc, "carol", "hunter2").await.unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_eq!(svc.verify(&pair.access_token, TokenKind::Access).unwrap(), "carol");
        assert_eq!(svc.verify(&pair.refresh_token, TokenKind::Refresh).unwrap(), "carol");
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_input() {
        let store = InMemoryCredentialStore::new();
        register(&store, &request("carol", "carol@example.com"))
            .await
            .unwrap();
        for req in [
            request("carol", "other@example.com"),
            request("other", "carol@example.com"),
            request("", "x@example.com"),
            request("dave", "not-an-email"),
        ] {
            assert!(matches!(register(&store, &req).await, Err(AppError::Validation(_))));
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn login_failures() {
        let store = InMemoryCredentialStore::new();
        register(&store, &request("carol", "carol@example.com"))
            .await
            .unwrap();
        let svc = tokens();
        assert!(matches!(
            login(&store, &svc, "carol", "wrong").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            login(&store, &svc, "nobody", "hunter2").await,
            Err(AppError::Unauthorized(_))
        ));
        store.set_active("carol", false).await;
        assert!(matches!(
            login(&store, &svc, "carol", "hunter2").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_and_rechecks_subject() {
        let store = InMemoryCredentialStore::new();
        register(&store, &request("carol", "carol@example.com"))
            .await
            .unwrap();
        let svc = tokens();
        let pair = login(&store, &svc, "carol", "hunter2").await.unwrap();

        let refreshed = refresh(&store, &svc, &pair.refresh_token).await.unwrap();
        assert_eq!(refreshed.refresh_token, pair.refresh_token);
        assert!(svc.verify(&refreshed.access_token, TokenKind::Access).is_ok());

        assert!(matches!(
            refresh(&store, &svc, &pair.access_token).await,
            Err(AppError::Unauthorized(_))
        ));

        store.set_active("carol", false).await;
        assert!(matches!(
            refresh(&store, &svc, &pair.refresh_token).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
