//! Catalog data for the listing, detail and registration pages.
//!
//! Unlike the state holders these calls keep nothing: each returns the page's
//! data or a [`PageError`] carrying the inline message to show.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use apagina_core::{BookDetails, BookId, BookPage, Genre, Review};

use crate::api::{ApiClient, ApiError};
use crate::error::report;

/// Reviews shown on a book page.
pub const REVIEWS_PER_BOOK: u32 = 20;

const BOOKS_FAILED: &str = "Falha ao carregar livros.";
const BOOK_NOT_FOUND: &str = "Livro não encontrado.";
const BOOK_FAILED: &str = "Falha ao carregar dados do livro.";
const GENRES_FAILED: &str = "Falha ao carregar gêneros.";

/// A failed page fetch, with the message to display inline.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PageError {
    message: String,
    #[source]
    source: Option<ApiError>,
}

impl PageError {
    /// An error that never reached the backend.
    #[must_use]
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a backend failure, preferring the backend's own message.
    #[must_use]
    pub fn from_api(fallback: &str, error: ApiError) -> Self {
        let message = error
            .backend_message()
            .map_or_else(|| fallback.to_string(), str::to_string);
        Self {
            message,
            source: Some(error),
        }
    }

    /// Message to show the shopper.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Filters for a book listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookQuery {
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

/// A book page: the record plus its most recent reviews.
#[derive(Debug, Clone)]
pub struct BookWithReviews {
    pub details: BookDetails,
    pub reviews: Vec<Review>,
}

/// Read-only access to the catalog.
#[derive(Clone)]
pub struct CatalogService {
    api: ApiClient,
}

impl CatalogService {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// List books. Carries `is_favorite` when the shopper is logged in.
    ///
    /// # Errors
    ///
    /// Returns a `PageError` if the listing cannot be fetched.
    #[instrument(skip(self))]
    pub async fn list_books(&self, query: &BookQuery) -> Result<BookPage, PageError> {
        self.api
            .list_books(query.search.as_deref(), query.limit, query.page)
            .await
            .map_err(|e| {
                report("list_books", &e);
                PageError::from_api(BOOKS_FAILED, e)
            })
    }

    /// Fetch one book's record.
    ///
    /// # Errors
    ///
    /// Returns "Livro não encontrado." if the book does not exist, or a
    /// `PageError` for any other failure.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn book(&self, id: BookId) -> Result<BookDetails, PageError> {
        self.api
            .get_book(id)
            .await
            .map_err(|e| book_error("book", e))
    }

    /// Fetch a book and its reviews concurrently.
    ///
    /// # Errors
    ///
    /// Returns "Livro não encontrado." if the book does not exist, or a
    /// `PageError` for any other failure of either request.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn book_with_reviews(&self, id: BookId) -> Result<BookWithReviews, PageError> {
        let (details, reviews) = tokio::try_join!(
            self.api.get_book(id),
            self.api.get_reviews(id, REVIEWS_PER_BOOK)
        )
        .map_err(|e| book_error("book_with_reviews", e))?;

        Ok(BookWithReviews { details, reviews })
    }

    /// Every genre, for the registration form.
    ///
    /// # Errors
    ///
    /// Returns a `PageError` if the genres cannot be fetched.
    #[instrument(skip(self))]
    pub async fn genres(&self) -> Result<Vec<Genre>, PageError> {
        self.api.get_genres().await.map_err(|e| {
            report("genres", &e);
            PageError::from_api(GENRES_FAILED, e)
        })
    }
}

fn book_error(action: &str, error: ApiError) -> PageError {
    report(action, &error);
    match error {
        ApiError::NotFound(_) | ApiError::Parse(_) => PageError {
            message: BOOK_NOT_FOUND.to_string(),
            source: Some(error),
        },
        error => PageError::from_api(BOOK_FAILED, error),
    }
}

/// Format a review date as `dd/mm/yyyy`, or "Data desconhecida".
#[must_use]
pub fn format_review_date(reviewed_at: Option<DateTime<Utc>>) -> String {
    reviewed_at.map_or_else(
        || "Data desconhecida".to_string(),
        |at| at.format("%d/%m/%Y").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_review_date() {
        let at = DateTime::from_timestamp(1_700_000_000, 0);
        assert_eq!(format_review_date(at), "14/11/2023");
        assert_eq!(format_review_date(None), "Data desconhecida");
    }

    #[test]
    fn test_page_error_prefers_backend_message() {
        let err = PageError::from_api(
            BOOKS_FAILED,
            ApiError::Rejected {
                status: 400,
                errors: vec![apagina_core::FieldError::general("Parâmetro inválido.")],
            },
        );
        assert_eq!(err.message(), "Parâmetro inválido.");
        assert!(std::error::Error::source(&err).is_some());

        let err = PageError::from_api(BOOKS_FAILED, ApiError::RateLimited(3));
        assert_eq!(err.to_string(), BOOKS_FAILED);
    }
}
