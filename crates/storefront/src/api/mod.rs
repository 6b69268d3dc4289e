//! REST client for the bookstore backend.
//!
//! Every request reads the persisted credential from storage and attaches it
//! as a bearer token, so holders never pass tokens around explicitly. The
//! genre list is cached using `moka`.

mod cache;
pub mod wire;

use std::sync::Arc;

use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use apagina_core::{
    BookDetails, BookId, BookPage, CartLineItem, FavoriteBook, FieldError, Genre,
    RegisterRequest, Review,
};

use crate::config::ClientConfig;
use crate::storage::{AUTH_TOKEN_KEY, KeyValueStore};

use cache::{CacheKey, CacheValue};
use wire::{
    AddToCartRequest, ErrorBody, LoginRequest, LoginResponse, ReviewsResponse,
    UpdateQuantityRequest,
};

// =============================================================================
// ApiError
// =============================================================================

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection refused, timeout, broken body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing or rejected credential (401/403).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-2xx status, with whatever messages the body carried.
    #[error("Request rejected with status {status}: {}", format_field_errors(.errors))]
    Rejected { status: u16, errors: Vec<FieldError> },
}

impl ApiError {
    /// Messages the backend attached to a rejection, if any.
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Rejected { errors, .. } => errors,
            _ => &[],
        }
    }

    /// The first backend-provided message, suitable for showing to a shopper.
    #[must_use]
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { errors, .. } => errors.first().map(|e| e.msg.as_str()),
            Self::Unauthorized(msg) | Self::NotFound(msg) if !msg.is_empty() => Some(msg.as_str()),
            _ => None,
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    if errors.is_empty() {
        return "(no error details provided)".to_string();
    }

    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the bookstore REST API.
///
/// Cheap to clone; all clones share one connection pool, one cache and one
/// credential store.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
    cache: Cache<CacheKey, CacheValue>,
}

impl ApiClient {
    /// Create a client for `config.api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS backend
    /// initialisation failure).
    pub fn new(config: &ClientConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(config.catalog_cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.api_url.clone(),
                store,
                cache,
            }),
        })
    }

    /// Base URL every path is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(&format!("{}{path}", self.inner.base_url))?)
    }

    /// Start a request, attaching the persisted credential when there is one.
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);

        match self.inner.store.get(AUTH_TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => builder.bearer_auth(token),
            Ok(_) => builder,
            Err(e) => {
                warn!(error = %e, "Could not read credential; sending request without it");
                builder
            }
        }
    }

    /// Send a request and return the raw body of a 2xx response.
    async fn execute(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if status.is_success() {
            return Ok(response_text);
        }

        let errors = serde_json::from_str::<ErrorBody>(&response_text)
            .map(ErrorBody::into_field_errors)
            .unwrap_or_default();

        let message = errors
            .first()
            .map(|e| e.msg.clone())
            .unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(status = %status, message = %message, "Backend rejected credential");
                Err(ApiError::Unauthorized(message))
            }
            StatusCode::NOT_FOUND => {
                debug!(message = %message, "Backend returned not found");
                Err(ApiError::NotFound(message))
            }
            _ if status.is_client_error() => {
                warn!(status = %status, message = %message, "Backend rejected request");
                Err(ApiError::Rejected {
                    status: status.as_u16(),
                    errors,
                })
            }
            _ => {
                tracing::error!(
                    status = %status,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Backend returned non-success status"
                );
                Err(ApiError::Rejected {
                    status: status.as_u16(),
                    errors,
                })
            }
        }
    }

    /// Send a request and parse its JSON body.
    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response_text = self.execute(builder).await?;

        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            ApiError::Parse(e)
        })
    }

    /// Send a cart request. An empty or `null` body means an empty cart.
    async fn execute_cart(&self, builder: RequestBuilder) -> Result<Vec<CartLineItem>, ApiError> {
        let response_text = self.execute(builder).await?;
        if response_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let items: Option<Vec<CartLineItem>> =
            serde_json::from_str(&response_text).map_err(|e| {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "Failed to parse cart response"
                );
                ApiError::Parse(e)
            })?;

        Ok(items.unwrap_or_default())
    }

    // =========================================================================
    // Auth Methods
    // =========================================================================

    /// Exchange an identifier (username or email) and password for a token.
    ///
    /// Returns `None` when the backend answered 2xx without a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        login_identifier: &str,
        password: &str,
    ) -> Result<Option<String>, ApiError> {
        let body = LoginRequest {
            login_identifier,
            password,
        };
        let builder = self.request(Method::POST, self.url("/auth/login")?).json(&body);
        let response: LoginResponse = self.execute_json(builder).await?;

        Ok(response.token.filter(|t| !t.is_empty()))
    }

    /// Create an account. Does not log in.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Rejected` with the backend's validation errors, or
    /// any transport error.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, self.url("/auth/register")?)
            .json(request);
        self.execute(builder).await?;
        Ok(())
    }

    // =========================================================================
    // Catalog Methods
    // =========================================================================

    /// List books, optionally filtered by a search term.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_books(
        &self,
        search: Option<&str>,
        limit: Option<u32>,
        page: Option<u32>,
    ) -> Result<BookPage, ApiError> {
        let mut url = self.url("/books")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
                query.append_pair("search", search);
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
            if let Some(page) = page {
                query.append_pair("page", &page.to_string());
            }
        }
        // A bare `?` is left behind when no pair was appended
        if url.query() == Some("") {
            url.set_query(None);
        }

        self.execute_json(self.request(Method::GET, url)).await
    }

    /// Get the full record of one book.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the book does not exist.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn get_book(&self, id: BookId) -> Result<BookDetails, ApiError> {
        let url = self.url(&format!("/books/{id}"))?;
        self.execute_json(self.request(Method::GET, url)).await
    }

    /// Get up to `limit` reviews of a book.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn get_reviews(&self, id: BookId, limit: u32) -> Result<Vec<Review>, ApiError> {
        let mut url = self.url(&format!("/books/{id}/reviews"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let response: ReviewsResponse = self.execute_json(self.request(Method::GET, url)).await?;
        Ok(response.data)
    }

    /// Get every genre. Cached for the configured catalog TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_genres(&self) -> Result<Vec<Genre>, ApiError> {
        if let Some(CacheValue::Genres(genres)) = self.inner.cache.get(&CacheKey::Genres).await {
            debug!("Cache hit for genres");
            return Ok(genres);
        }

        let url = self.url("/genres")?;
        let genres: Vec<Genre> = self.execute_json(self.request(Method::GET, url)).await?;

        self.inner
            .cache
            .insert(CacheKey::Genres, CacheValue::Genres(genres.clone()))
            .await;

        Ok(genres)
    }

    // =========================================================================
    // Favorite Methods
    // =========================================================================

    /// Get the signed-in user's favorite books.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` without a valid credential.
    #[instrument(skip(self))]
    pub async fn get_favorites(&self) -> Result<Vec<FavoriteBook>, ApiError> {
        let url = self.url("/favorites")?;
        self.execute_json(self.request(Method::GET, url)).await
    }

    /// Mark a book as favorite.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn add_favorite(&self, id: BookId) -> Result<(), ApiError> {
        let url = self.url(&format!("/favorites/{id}"))?;
        self.execute(self.request(Method::POST, url)).await?;
        Ok(())
    }

    /// Unmark a book as favorite.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn remove_favorite(&self, id: BookId) -> Result<(), ApiError> {
        let url = self.url(&format!("/favorites/{id}"))?;
        self.execute(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    // =========================================================================
    // Cart Methods
    // =========================================================================

    /// Get the server cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn get_cart(&self) -> Result<Vec<CartLineItem>, ApiError> {
        let url = self.url("/cart")?;
        self.execute_cart(self.request(Method::GET, url)).await
    }

    /// Add `quantity` copies of a book; the backend sums with any existing
    /// line. Returns the new cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(book_id = %book_id))]
    pub async fn add_to_cart(
        &self,
        book_id: BookId,
        quantity: u32,
    ) -> Result<Vec<CartLineItem>, ApiError> {
        let body = AddToCartRequest { book_id, quantity };
        let builder = self.request(Method::POST, self.url("/cart")?).json(&body);
        self.execute_cart(builder).await
    }

    /// Set the quantity of a line. Returns the new cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(book_id = %book_id))]
    pub async fn update_cart_item(
        &self,
        book_id: BookId,
        quantity: u32,
    ) -> Result<Vec<CartLineItem>, ApiError> {
        let body = UpdateQuantityRequest { quantity };
        let url = self.url(&format!("/cart/{book_id}"))?;
        let builder = self.request(Method::PUT, url).json(&body);
        self.execute_cart(builder).await
    }

    /// Remove a line. Returns the new cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(book_id = %book_id))]
    pub async fn remove_cart_item(&self, book_id: BookId) -> Result<Vec<CartLineItem>, ApiError> {
        let url = self.url(&format!("/cart/{book_id}"))?;
        self.execute_cart(self.request(Method::DELETE, url)).await
    }

    /// Empty the server cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), ApiError> {
        let url = self.url("/cart")?;
        self.execute(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
