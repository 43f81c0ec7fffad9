//! Route paths.

pub const GET_HEALTH: &str = "/health";

pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const GET_AUTH_ME: &str = "/auth/me";

pub const GET_BOOKS_PUBLIC: &str = "/api/v1/books/public";
pub const BOOKS: &str = "/api/v1/books";
pub const BOOKS_ID: &str = "/api/v1/books/{id}";
