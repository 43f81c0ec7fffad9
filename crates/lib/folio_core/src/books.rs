//! Book catalog: the record store behind the protected routes.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::books::{Book, NewBook};

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Book storage consumed by the API layer.
#[async_trait]
pub trait BookCatalog: Send + Sync {
    async fn list(&self) -> Result<Vec<Book>, CatalogError>;

    async fn get(&self, id: &str) -> Result<Option<Book>, CatalogError>;

    async fn create(&self, book: &NewBook) -> Result<Book, CatalogError>;

    /// Returns `false` if no book had that id.
    async fn delete(&self, id: &str) -> Result<bool, CatalogError>;
}

fn validate(book: &NewBook) -> Result<(), CatalogError> {
    if book.title.trim().is_empty() {
        return Err(CatalogError::Validation("title must not be empty".into()));
    }
    if book.author.trim().is_empty() {
        return Err(CatalogError::Validation("author must not be empty".into()));
    }
    Ok(())
}

type BookRow = (String, String, String, Option<i32>, Option<String>);

fn into_book((id, title, author, year, isbn): BookRow) -> Book {
    Book {
        id,
        title,
        author,
        year,
        isbn,
    }
}

/// PostgreSQL-backed catalog.
#[derive(Clone)]
pub struct PgBookCatalog {
    pool: PgPool,
}

impl PgBookCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookCatalog for PgBookCatalog {
    async fn list(&self) -> Result<Vec<Book>, CatalogError> {
        let rows = sqlx::query_as::<_, BookRow>(
            "SELECT id::text, title, author, year, isbn FROM books ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(into_book).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, CatalogError> {
        // Ids that are not UUIDs cannot exist.
        if Uuid::parse_str(id).is_err() {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, BookRow>(
            "SELECT id::text, title, author, year, isbn FROM books WHERE id = $1::uuid",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(into_book))
    }

    async fn create(&self, book: &NewBook) -> Result<Book, CatalogError> {
        validate(book)?;
        let row = sqlx::query_as::<_, BookRow>(
            "INSERT INTO books (id, title, author, year, isbn) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id::text, title, author, year, isbn",
        )
        .bind(Uuid::now_v7())
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.year)
        .bind(&book.isbn)
        .fetch_one(&self.pool)
        .await?;
        Ok(into_book(row))
    }

    async fn delete(&self, id: &str) -> Result<bool, CatalogError> {
        if Uuid::parse_str(id).is_err() {
            return Ok(false);
        }
        let result = sqlx::query("DELETE FROM books WHERE id = $1::uuid")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// In-memory catalog for ephemeral runs and tests.
#[derive(Default)]
pub struct InMemoryBookCatalog {
    books: DashMap<String, Book>,
}

impl InMemoryBookCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookCatalog for InMemoryBookCatalog {
    async fn list(&self) -> Result<Vec<Book>, CatalogError> {
        let mut books: Vec<Book> = self.books.iter().map(|e| e.value().clone()).collect();
        books.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(books)
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, CatalogError> {
        Ok(self.books.get(id).map(|e| e.value().clone()))
    }

    async fn create(&self, book: &NewBook) -> Result<Book, CatalogError> {
        validate(book)?;
        let book = Book {
            id: Uuid::now_v7().to_string(),
            title: book.title.clone(),
            author: book.author.clone(),
            year: book.year,
            isbn: book.isbn.clone(),
        };
        self.books.insert(book.id.clone(), book.clone());
        Ok(book)
    }

    async fn delete(&self, id: &str) -> Result<bool, CatalogError> {
        Ok(self.books.remove(id).is_some())
    }
}
