// @zen-component: AUTH-LoginEndpoint
// @zen-component: AUTH-RegistrationEndpoint
// @zen-component: AUTH-TokenRefreshEndpoint
//
//! Authentication request handlers.
//!
//! Registration, login and refresh are entry points: they are neither
//! auth-gated nor rate-limited.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::AppJson;
use crate::models::{LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, UserResponse};
use crate::services::auth;

/// `POST /auth/register`: create a new user account.
pub async fn register_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = auth::register(state.credentials.as_ref(), &body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /auth/login`: authenticate with username + password.
pub async fn login_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::login(
        state.credentials.as_ref(),
        &state.tokens,
        &body.username,
        &body.password,
    )
    .await?;
    Ok(Json(resp))
}

/// `POST /auth/refresh`: exchange a refresh token for a new access token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::refresh(state.credentials.as_ref(), &state.tokens, &body.refresh_token).await?;
    Ok(Json(resp))
}

/// `GET /auth/me`: profile of the bearer.
pub async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<UserResponse>> {
    let user = state.guard.authenticate(&headers).await?;
    Ok(Json(auth::me(user)))
}
