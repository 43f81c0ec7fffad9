//! # folio_api
//!
//! HTTP API library for Folio.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use folio_core::auth::{CredentialStore, IdentityResolver, TokenConfig, TokenService};
use folio_core::books::BookCatalog;
use folio_core::ratelimit::{CounterStore, RateLimitConfig, RateLimiter};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, books, health};
use crate::middleware::AccessGuard;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// User storage for the auth entry points.
    pub credentials: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenService>,
    /// Identity resolution plus quota admission for guarded routes.
    pub guard: AccessGuard,
    pub catalog: Arc<dyn BookCatalog>,
}

impl AppState {
    /// Wire the token service, resolver, limiter and guard over the given stores.
    pub fn new(
        token: &TokenConfig,
        rate_limit: RateLimitConfig,
        credentials: Arc<dyn CredentialStore>,
        counters: Arc<dyn CounterStore>,
        catalog: Arc<dyn BookCatalog>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(token));
        let resolver = IdentityResolver::new(tokens.clone(), credentials.clone());
        let limiter = RateLimiter::new(counters, rate_limit);
        Self {
            credentials,
            tokens,
            guard: AccessGuard::new(resolver, limiter),
            catalog,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// mixed book route keys anonymous callers by peer address.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::GET_BOOKS_PUBLIC, get(books::list_public_handler))
        .route(
            routes::BOOKS,
            get(books::list_handler).post(books::create_handler),
        )
        .route(
            routes::BOOKS_ID,
            get(books::get_handler).delete(books::delete_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
