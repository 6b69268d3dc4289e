//! Integration tests for browsing, search and registration.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use apagina_core::{BookId, GenreId, RegisterResult};
use apagina_integration_tests::MockBackend;
use apagina_storefront::catalog::{BookQuery, format_review_date};
use apagina_storefront::register::{BOOKS_REQUIRED, BookChoice, RegistrationForm};

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_list_books_pages() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();

    let query = BookQuery {
        search: None,
        limit: Some(2),
        page: Some(3),
    };
    let page = storefront.catalog().list_books(&query).await.unwrap();

    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, BookId::new(5));
    assert_eq!(page.pagination.total, Some(5));
    assert_eq!(page.pagination.total_pages, Some(3));
    // Anonymous listings carry no favorite flag
    assert_eq!(page.data[0].is_favorite, None);
}

#[tokio::test]
async fn test_book_with_reviews() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();

    let page = storefront
        .catalog()
        .book_with_reviews(BookId::new(1))
        .await
        .unwrap();

    assert_eq!(page.details.book.title, "Dom Casmurro");
    assert_eq!(page.details.book.author_list(), vec!["Machado de Assis"]);
    assert_eq!(page.reviews.len(), 1);
    assert_eq!(format_review_date(page.reviews[0].reviewed_at()), "14/11/2023");
    assert!(
        backend
            .requests()
            .iter()
            .any(|r| r == "GET /api/books/1/reviews?limit=20")
    );
}

#[tokio::test]
async fn test_missing_book_reports_not_found() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();

    let err = storefront
        .catalog()
        .book_with_reviews(BookId::new(99))
        .await
        .unwrap_err();
    assert_eq!(err.message(), "Livro não encontrado.");
}

#[tokio::test]
async fn test_genres_are_cached() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();

    let first = storefront.catalog().genres().await.unwrap();
    let second = storefront.catalog().genres().await.unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(backend.request_count("GET /api/genres"), 1);
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_typing_burst_sends_one_search() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();
    let search = storefront.book_search();
    let mut updates = search.subscribe();

    for term in ["ma", "mac", "mach"] {
        search.input(term);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let state = tokio::time::timeout(
        Duration::from_secs(2),
        updates.wait_for(|state| !state.searching),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    assert_eq!(state.term, "mach");
    assert!(state.error.is_none());
    let mut found: Vec<_> = state.results.iter().map(|b| b.id.as_i32()).collect();
    found.sort_unstable();
    assert_eq!(found, vec![1, 4]);

    assert_eq!(backend.request_count("GET /api/books"), 1);
    assert!(
        backend
            .requests()
            .iter()
            .any(|r| r.contains("search=mach") && r.contains("limit=10"))
    );
}

#[tokio::test]
async fn test_short_term_sends_nothing() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();
    let search = storefront.book_search();

    search.input("m");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(search.current().results.is_empty());
    assert_eq!(backend.request_count("GET /api/books"), 0);
}

// =============================================================================
// Registration
// =============================================================================

fn form(username: &str, books: &[i32]) -> RegistrationForm {
    let mut form = RegistrationForm::new();
    form.username = username.to_string();
    form.email = format!("{username}@apagina.com.br");
    form.set_password("segredo");
    for &id in books {
        form.select_book(BookChoice {
            id: BookId::new(id),
            title: format!("Livro {id}"),
        });
    }
    form.toggle_genre(GenreId::new(1));
    form
}

#[tokio::test]
async fn test_register_then_login() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();
    storefront.init().await;

    assert_eq!(
        storefront.register(&form("nova", &[1, 2])).await,
        RegisterResult::Success
    );
    assert!(backend.has_account("nova"));
    // Registering does not log in
    assert!(!storefront.auth().is_authenticated());

    assert!(storefront.login("nova", "segredo").await);
}

#[tokio::test]
async fn test_register_with_one_book_makes_no_request() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();

    let result = storefront.register(&form("nova", &[1])).await;

    assert_eq!(result.messages(), vec![BOOKS_REQUIRED.to_string()]);
    assert_eq!(backend.request_count("POST /api/auth/register"), 0);
}

#[tokio::test]
async fn test_register_taken_username_shows_backend_errors() {
    let backend = MockBackend::start().await.unwrap();
    backend.add_account("leitora", "outra@apagina.com.br", "segredo");
    let (storefront, _store) = backend.session().unwrap();

    let result = storefront.register(&form("leitora", &[1, 2])).await;

    let RegisterResult::ValidationFailure(errors) = result else {
        panic!("expected validation failure, got {result:?}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field.as_deref(), Some("username"));
    assert_eq!(errors[0].msg, "Nome de usuário já está em uso.");
}
