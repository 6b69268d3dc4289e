//! Integration tests for the A Página storefront client.
//!
//! The tests drive a real [`Storefront`](apagina_storefront::state::Storefront)
//! against [`MockBackend`], an in-process axum server that speaks the
//! bookstore REST API and keeps its data in memory.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p apagina-integration-tests
//! ```
//!
//! # Knobs
//!
//! Besides seeding accounts and carts, a test can make the backend misbehave:
//! fail cart additions for a book, fail favorite removals, delay cart
//! additions or favorite requests, and issue short-lived tokens. Every request
//! is logged as `METHOD /path?query` for assertions.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use apagina_core::{
    Book, BookDetails, BookId, CartLineItem, Genre, GenreId, Price, Review, ReviewId, User, UserId,
};
use apagina_storefront::config::ClientConfig;
use apagina_storefront::error::ClientError;
use apagina_storefront::state::Storefront;
use apagina_storefront::storage::MemoryStore;

/// Lifetime of tokens issued by `/auth/login` unless changed.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Debounce window of sessions built by [`MockBackend::session`].
pub const TEST_SEARCH_DEBOUNCE: Duration = Duration::from_millis(100);

type AppState = Arc<Mutex<Data>>;

struct Account {
    user: User,
    email: String,
    password: String,
}

struct Data {
    accounts: Vec<Account>,
    books: Vec<BookDetails>,
    genres: Vec<Genre>,
    reviews: HashMap<BookId, Vec<Review>>,
    carts: HashMap<UserId, Vec<CartLineItem>>,
    favorites: HashMap<UserId, BTreeSet<BookId>>,
    requests: Vec<String>,
    failing_cart_adds: HashSet<BookId>,
    fail_favorite_removals: bool,
    cart_add_delay: Option<Duration>,
    favorite_delay: Option<Duration>,
    token_ttl_secs: i64,
}

impl Data {
    fn seeded() -> Self {
        let books = vec![
            details(1, "Dom Casmurro", "['Machado de Assis']", Some("$12.99"), Some(4.5)),
            details(2, "A Hora da Estrela", "['Clarice Lispector']", Some("R$ 30,00"), Some(4.0)),
            details(3, "Grande Sertão: Veredas", "['João Guimarães Rosa']", Some("45.5"), None),
            details(4, "Memórias Póstumas de Brás Cubas", "['Machado de Assis']", Some("$9.90"), Some(3.5)),
            details(5, "Vidas Secas", "['Graciliano Ramos']", None, Some(4.2)),
        ];

        let reviews = HashMap::from([(
            BookId::new(1),
            vec![Review {
                id: ReviewId::new(1),
                profile_name: Some("Capitu".to_string()),
                review_score: Some(5.0),
                review_time: Some(1_700_000_000),
                review_summary: Some("Inesquecível".to_string()),
                review_text: Some("Olhos de ressaca.".to_string()),
            }],
        )]);

        let genres = ["Romance", "Ficção Científica", "Poesia"]
            .iter()
            .zip(1..)
            .map(|(name, id)| Genre {
                id: GenreId::new(id),
                name: (*name).to_string(),
            })
            .collect();

        Self {
            accounts: Vec::new(),
            books,
            genres,
            reviews,
            carts: HashMap::new(),
            favorites: HashMap::new(),
            requests: Vec::new(),
            failing_cart_adds: HashSet::new(),
            fail_favorite_removals: false,
            cart_add_delay: None,
            favorite_delay: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }

    fn book(&self, id: BookId) -> Option<&BookDetails> {
        self.books.iter().find(|d| d.book.id == id)
    }

    /// Mark `book` the way the backend does for an authenticated caller.
    fn for_caller(&self, mut book: Book, caller: Option<UserId>) -> Book {
        book.is_favorite = caller.map(|user| {
            self.favorites
                .get(&user)
                .is_some_and(|set| set.contains(&book.id))
        });
        book
    }

    fn cart(&self, user: UserId) -> Vec<CartLineItem> {
        self.carts.get(&user).cloned().unwrap_or_default()
    }
}

fn details(
    id: i32,
    title: &str,
    authors: &str,
    price: Option<&str>,
    score: Option<f64>,
) -> BookDetails {
    BookDetails {
        book: Book {
            id: BookId::new(id),
            title: title.to_string(),
            authors: Some(authors.to_string()),
            image: Some(format!("https://covers.apagina.test/{id}.jpg")),
            categories: Some("['Fiction']".to_string()),
            price: price.map(str::to_string),
            average_score: score,
            reviews_count: Some(1),
            is_favorite: None,
        },
        description: Some(format!("Sobre {title}.")),
        preview_link: None,
        publisher: Some("Editora Página".to_string()),
        published_date: Some("1899".to_string()),
        info_link: None,
    }
}

fn lock(state: &Mutex<Data>) -> MutexGuard<'_, Data> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// MockBackend
// =============================================================================

/// An in-memory bookstore backend listening on an ephemeral local port.
///
/// The server stops when the value is dropped.
pub struct MockBackend {
    addr: SocketAddr,
    state: AppState,
    server: JoinHandle<()>,
}

impl MockBackend {
    /// Bind to `127.0.0.1:0` and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state: AppState = Arc::new(Mutex::new(Data::seeded()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(Arc::clone(&state));

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Mock backend stopped");
            }
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    /// Base URL to give the client, e.g. `http://127.0.0.1:41234/api`.
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// A fresh client session against this backend, over an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn session(&self) -> Result<(Storefront, Arc<MemoryStore>), ClientError> {
        let store = Arc::new(MemoryStore::new());
        let storefront = self.session_with(Arc::clone(&store))?;
        Ok((storefront, store))
    }

    /// A client session over an existing store, as after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn session_with(&self, store: Arc<MemoryStore>) -> Result<Storefront, ClientError> {
        let mut config = ClientConfig::with_api_url(&self.api_url())?;
        config.search_debounce = TEST_SEARCH_DEBOUNCE;
        Storefront::with_store(config, store)
    }

    /// Create an account that can log in immediately.
    pub fn add_account(&self, username: &str, email: &str, password: &str) -> User {
        let mut data = lock(&self.state);
        let next_id = i32::try_from(data.accounts.len()).unwrap_or(i32::MAX - 1) + 1;
        let user = User {
            id: UserId::new(next_id),
            username: username.to_string(),
        };
        data.accounts.push(Account {
            user: user.clone(),
            email: email.to_string(),
            password: password.to_string(),
        });
        user
    }

    /// Whether an account with this username exists.
    #[must_use]
    pub fn has_account(&self, username: &str) -> bool {
        lock(&self.state)
            .accounts
            .iter()
            .any(|a| a.user.username == username)
    }

    /// Lifetime of tokens issued from now on. Negative values issue tokens
    /// that are already expired.
    pub fn set_token_ttl(&self, secs: i64) {
        lock(&self.state).token_ttl_secs = secs;
    }

    /// Replace a user's server cart with `(book, quantity)` lines.
    pub fn seed_cart(&self, user: UserId, lines: &[(BookId, u32)]) {
        let mut data = lock(&self.state);
        let items = lines
            .iter()
            .filter_map(|&(id, quantity)| {
                data.book(id).map(|details| CartLineItem {
                    quantity,
                    ..details.book.cart_item().into_line()
                })
            })
            .collect();
        data.carts.insert(user, items);
    }

    /// A user's server cart as `(book, quantity)` pairs, ordered by book.
    #[must_use]
    pub fn cart_quantities(&self, user: UserId) -> Vec<(BookId, u32)> {
        let mut lines: Vec<(BookId, u32)> = lock(&self.state)
            .cart(user)
            .iter()
            .map(|line| (line.id, line.quantity))
            .collect();
        lines.sort_unstable();
        lines
    }

    /// A user's favorite book IDs, ordered.
    #[must_use]
    pub fn favorites_of(&self, user: UserId) -> Vec<BookId> {
        lock(&self.state)
            .favorites
            .get(&user)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Answer 500 to every `POST /cart` for this book.
    pub fn fail_cart_adds_for(&self, book: BookId) {
        lock(&self.state).failing_cart_adds.insert(book);
    }

    /// Accept cart additions for every book again.
    pub fn restore_cart_adds(&self) {
        lock(&self.state).failing_cart_adds.clear();
    }

    /// Answer 500 to every `DELETE /favorites/:id`.
    pub fn fail_favorite_removals(&self) {
        lock(&self.state).fail_favorite_removals = true;
    }

    /// Hold `POST /cart` responses for `delay` after the cart has changed.
    pub fn delay_cart_adds(&self, delay: Duration) {
        lock(&self.state).cart_add_delay = Some(delay);
    }

    /// Hold favorite requests for `delay` before applying them.
    pub fn delay_favorites(&self, delay: Duration) {
        lock(&self.state).favorite_delay = Some(delay);
    }

    /// Every request received, as `METHOD /path?query`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state).requests.clone()
    }

    /// Requests whose line starts with `prefix` (e.g. `"POST /api/cart"`).
    #[must_use]
    pub fn request_count(&self, prefix: &str) -> usize {
        lock(&self.state)
            .requests
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    pub fn clear_requests(&self) {
        lock(&self.state).requests.clear();
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Build an unsigned JWT carrying `user`, valid for `ttl_secs` from now.
#[must_use]
pub fn mint_token(user: &User, ttl_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "none", "typ": "JWT" }).to_string());
    let payload = URL_SAFE_NO_PAD.encode(
        json!({ "user": user, "iat": now, "exp": now + ttl_secs }).to_string(),
    );
    format!("{header}.{payload}.mock")
}

// =============================================================================
// Routes
// =============================================================================

fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/books", get(list_books))
        .route("/books/{id}", get(get_book))
        .route("/books/{id}/reviews", get(get_reviews))
        .route("/genres", get(get_genres))
        .route("/favorites", get(get_favorites))
        .route("/favorites/{id}", post(add_favorite).delete(remove_favorite))
        .route("/cart", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/cart/{id}", put(update_cart_item).delete(remove_cart_item));

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), record))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn record(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let target = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_string(), ToString::to_string);
    lock(&state)
        .requests
        .push(format!("{} {target}", request.method()));
    next.run(request).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

#[derive(Deserialize)]
struct Claims {
    user: User,
    exp: i64,
}

fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// The authenticated caller, or the 401 the backend would send.
fn caller(headers: &HeaderMap) -> Result<UserId, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Token não fornecido."))?;

    let claims =
        decode_claims(token).ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Token inválido."))?;
    if claims.exp <= Utc::now().timestamp() {
        return Err(error(StatusCode::UNAUTHORIZED, "Token expirado."));
    }
    Ok(claims.user.id)
}

// -----------------------------------------------------------------------------
// Auth
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    login_identifier: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginBody>) -> Response {
    let data = lock(&state);
    let account = data.accounts.iter().find(|a| {
        (a.user.username == body.login_identifier || a.email == body.login_identifier)
            && a.password == body.password
    });

    match account {
        Some(account) => {
            Json(json!({ "token": mint_token(&account.user, data.token_ttl_secs) }))
                .into_response()
        }
        None => error(StatusCode::UNAUTHORIZED, "Credenciais inválidas."),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    username: String,
    email: String,
    password: String,
    favorite_book_ids: Vec<BookId>,
    favorite_genre_ids: Vec<GenreId>,
}

async fn register(State(state): State<AppState>, Json(body): Json<RegisterBody>) -> Response {
    let mut data = lock(&state);

    let mut errors = Vec::new();
    if data.accounts.iter().any(|a| a.user.username == body.username) {
        errors.push(json!({ "msg": "Nome de usuário já está em uso.", "path": "username" }));
    }
    if data.accounts.iter().any(|a| a.email == body.email) {
        errors.push(json!({ "msg": "Email já cadastrado.", "path": "email" }));
    }
    if body.favorite_book_ids.len() != 2 || body.favorite_genre_ids.is_empty() {
        errors.push(json!({ "msg": "Preferências inválidas.", "path": "favoriteBookIds" }));
    }
    if !errors.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response();
    }

    let next_id = i32::try_from(data.accounts.len()).unwrap_or(i32::MAX - 1) + 1;
    data.accounts.push(Account {
        user: User {
            id: UserId::new(next_id),
            username: body.username,
        },
        email: body.email,
        password: body.password,
    });

    (
        StatusCode::CREATED,
        Json(json!({ "message": "Usuário registrado com sucesso." })),
    )
        .into_response()
}

// -----------------------------------------------------------------------------
// Catalog
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct BooksQuery {
    search: Option<String>,
    limit: Option<usize>,
    page: Option<usize>,
}

async fn list_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BooksQuery>,
) -> Response {
    let data = lock(&state);
    let viewer = caller(&headers).ok();
    let needle = query.search.map(|s| s.to_lowercase());

    let matching: Vec<Book> = data
        .books
        .iter()
        .map(|d| &d.book)
        .filter(|book| {
            needle.as_deref().is_none_or(|needle| {
                book.title.to_lowercase().contains(needle)
                    || book
                        .authors
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(needle))
            })
        })
        .map(|book| data.for_caller(book.clone(), viewer))
        .collect();

    let limit = query.limit.unwrap_or(40).max(1);
    let page = query.page.unwrap_or(1).max(1);
    let total = matching.len();
    let rows: Vec<Book> = matching
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    Json(json!({
        "data": rows,
        "pagination": {
            "page": page,
            "limit": limit,
            "totalItems": total,
            "totalPages": total.div_ceil(limit),
        },
    }))
    .into_response()
}

async fn get_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let data = lock(&state);
    let viewer = caller(&headers).ok();

    match data.book(BookId::new(id)) {
        Some(details) => {
            let mut details = details.clone();
            details.book = data.for_caller(details.book, viewer);
            Json(details).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "Livro não encontrado."),
    }
}

#[derive(Deserialize)]
struct ReviewsQuery {
    limit: Option<usize>,
}

async fn get_reviews(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<ReviewsQuery>,
) -> Response {
    let data = lock(&state);
    let reviews: Vec<Review> = data
        .reviews
        .get(&BookId::new(id))
        .map(|r| r.iter().take(query.limit.unwrap_or(usize::MAX)).cloned().collect())
        .unwrap_or_default();
    Json(json!({ "data": reviews })).into_response()
}

async fn get_genres(State(state): State<AppState>) -> Response {
    Json(lock(&state).genres.clone()).into_response()
}

// -----------------------------------------------------------------------------
// Favorites
// -----------------------------------------------------------------------------

async fn get_favorites(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match caller(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let data = lock(&state);
    let books: Vec<Book> = data
        .favorites
        .get(&user)
        .into_iter()
        .flatten()
        .filter_map(|id| data.book(*id))
        .map(|details| data.for_caller(details.book.clone(), Some(user)))
        .collect();
    Json(books).into_response()
}

fn favorite_delay(state: &AppState) -> Option<Duration> {
    lock(state).favorite_delay
}

async fn add_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user = match caller(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Some(delay) = favorite_delay(&state) {
        tokio::time::sleep(delay).await;
    }

    let mut data = lock(&state);
    let id = BookId::new(id);
    if data.book(id).is_none() {
        return error(StatusCode::NOT_FOUND, "Livro não encontrado.");
    }
    data.favorites.entry(user).or_default().insert(id);
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Adicionado aos favoritos." })),
    )
        .into_response()
}

async fn remove_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user = match caller(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if let Some(delay) = favorite_delay(&state) {
        tokio::time::sleep(delay).await;
    }

    let mut data = lock(&state);
    if data.fail_favorite_removals {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Erro interno." })),
        )
            .into_response();
    }
    if let Some(set) = data.favorites.get_mut(&user) {
        set.remove(&BookId::new(id));
    }
    Json(json!({ "message": "Removido dos favoritos." })).into_response()
}

// -----------------------------------------------------------------------------
// Cart
// -----------------------------------------------------------------------------

async fn get_cart(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match caller(&headers) {
        Ok(user) => Json(lock(&state).cart(user)).into_response(),
        Err(response) => response,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    book_id: BookId,
    quantity: u32,
}

async fn add_to_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AddBody>,
) -> Response {
    let user = match caller(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let (snapshot, delay) = {
        let mut data = lock(&state);
        if data.failing_cart_adds.contains(&body.book_id) {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Erro ao adicionar ao carrinho." })),
            )
                .into_response();
        }
        let Some(details) = data.book(body.book_id) else {
            return error(StatusCode::NOT_FOUND, "Livro não encontrado.");
        };
        let added = CartLineItem {
            quantity: body.quantity,
            ..details.book.cart_item().into_line()
        };

        let cart = data.carts.entry(user).or_default();
        match cart.iter_mut().find(|line| line.id == body.book_id) {
            Some(line) => line.quantity += body.quantity,
            None => cart.push(added),
        }
        (cart.clone(), data.cart_add_delay)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Json(snapshot).into_response()
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: u32,
}

async fn update_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(body): Json<QuantityBody>,
) -> Response {
    let user = match caller(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let mut data = lock(&state);
    let cart = data.carts.entry(user).or_default();
    let id = BookId::new(id);
    let Some(line) = cart.iter_mut().find(|line| line.id == id) else {
        return error(StatusCode::NOT_FOUND, "Item não está no carrinho.");
    };

    if body.quantity == 0 {
        cart.retain(|line| line.id != id);
    } else {
        line.quantity = body.quantity;
    }
    Json(cart.clone()).into_response()
}

async fn remove_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let user = match caller(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let mut data = lock(&state);
    let cart = data.carts.entry(user).or_default();
    cart.retain(|line| line.id != BookId::new(id));
    Json(cart.clone()).into_response()
}

async fn clear_cart(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match caller(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    lock(&state).carts.remove(&user);
    Json(json!({ "message": "Carrinho limpo." })).into_response()
}

/// Prices the mock catalog resolves, for assertions on totals.
#[must_use]
pub fn catalog_price(book: BookId) -> Option<Price> {
    Data::seeded().book(book).and_then(|d| d.book.price())
}
