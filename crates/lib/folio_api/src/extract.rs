//! Extractors whose rejections render as [`AppError`].

use axum::extract::FromRequest;

use crate::error::AppError;

/// JSON body extractor. Malformed or incomplete bodies become a 400 with the
/// usual `{error, message}` envelope instead of axum's plain-text rejection.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
