//! Book catalog handlers.
//!
//! Every handler starts with an explicit guard call.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use folio_core::auth::Identity;
use folio_core::models::books::{Book, NewBook};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::models::{BookListResponse, MessageResponse};

/// `GET /api/v1/books/public`: open to everyone, limited per caller class.
pub async fn list_public_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> AppResult<Json<BookListResponse>> {
    let identity = state.guard.optional(&headers, peer.ip()).await?;
    let books = state.catalog.list().await?;
    let user = match &identity {
        Identity::User(user) => Some(user.username.clone()),
        Identity::Anonymous(_) => None,
    };
    Ok(Json(BookListResponse {
        count: books.len(),
        books,
        user,
        user_type: Some(identity.class().to_string()),
    }))
}

/// `GET /api/v1/books`
pub async fn list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<BookListResponse>> {
    let user = state.guard.require(&headers).await?;
    let books = state.catalog.list().await?;
    Ok(Json(BookListResponse {
        count: books.len(),
        books,
        user: Some(user.username),
        user_type: None,
    }))
}

/// `GET /api/v1/books/{id}`
pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<Book>> {
    state.guard.require(&headers).await?;
    state
        .catalog
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("book {id}")))
}

/// `POST /api/v1/books`
pub async fn create_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(body): AppJson<NewBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let user = state.guard.require(&headers).await?;
    let book = state.catalog.create(&body).await?;
    info!(book_id = %book.id, username = %user.username, "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

/// `DELETE /api/v1/books/{id}`
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<MessageResponse>> {
    let user = state.guard.require(&headers).await?;
    if !state.catalog.delete(&id).await? {
        return Err(AppError::NotFound(format!("book {id}")));
    }
    info!(book_id = %id, username = %user.username, "book deleted");
    Ok(Json(MessageResponse {
        message: format!("Book {id} deleted"),
    }))
}
