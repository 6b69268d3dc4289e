//! Integration tests for optimistic favorite toggles.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use apagina_core::BookId;
use apagina_integration_tests::MockBackend;
use apagina_storefront::favorites::{LOGIN_REQUIRED, TOGGLE_FAILED, ToggleOutcome, ToggleState};
use apagina_storefront::state::Storefront;

const PASSWORD: &str = "segredo";

async fn logged_in(backend: &MockBackend) -> Storefront {
    backend.add_account("leitora", "leitora@apagina.com.br", PASSWORD);
    let (storefront, _store) = backend.session().unwrap();
    storefront.init().await;
    assert!(storefront.login("leitora", PASSWORD).await);
    storefront
}

#[tokio::test]
async fn test_guest_toggle_requires_login() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();
    storefront.init().await;

    let toggle = storefront.favorite_toggle(BookId::new(1), None);
    assert_eq!(toggle.toggle().await, ToggleOutcome::LoginRequired);
    assert_eq!(toggle.last_error().as_deref(), Some(LOGIN_REQUIRED));
    assert!(!toggle.is_favorite());
    assert_eq!(backend.request_count("POST /api/favorites"), 0);
}

#[tokio::test]
async fn test_failed_second_toggle_rolls_back() {
    let backend = MockBackend::start().await.unwrap();
    let storefront = logged_in(&backend).await;
    let user = storefront.auth().user().unwrap();

    let toggle = storefront.favorite_toggle(BookId::new(1), Some(false));
    assert_eq!(toggle.toggle().await, ToggleOutcome::Committed(true));
    assert_eq!(backend.favorites_of(user.id), vec![BookId::new(1)]);

    backend.fail_favorite_removals();
    assert_eq!(
        toggle.toggle().await,
        ToggleOutcome::RolledBack {
            restored: true,
            message: TOGGLE_FAILED.to_string(),
        }
    );
    assert!(toggle.is_favorite());
    assert_eq!(toggle.state(), ToggleState::Settled(true));
    assert_eq!(toggle.last_error().as_deref(), Some(TOGGLE_FAILED));
    assert_eq!(backend.favorites_of(user.id), vec![BookId::new(1)]);
}

#[tokio::test]
async fn test_press_while_pending_is_ignored() {
    let backend = MockBackend::start().await.unwrap();
    let storefront = logged_in(&backend).await;
    backend.delay_favorites(Duration::from_millis(300));

    let toggle = storefront.favorite_toggle(BookId::new(2), None);
    let first = {
        let toggle = toggle.clone();
        tokio::spawn(async move { toggle.toggle().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The speculative value shows while the request is outstanding
    assert!(toggle.is_pending());
    assert!(toggle.is_favorite());
    assert_eq!(toggle.toggle().await, ToggleOutcome::Ignored);

    assert_eq!(first.await.unwrap(), ToggleOutcome::Committed(true));
    assert!(!toggle.is_pending());
    assert_eq!(backend.request_count("POST /api/favorites/2"), 1);
}

#[tokio::test]
async fn test_favorites_page_and_listing_flags() {
    let backend = MockBackend::start().await.unwrap();
    let storefront = logged_in(&backend).await;

    let toggle = storefront.favorite_toggle(BookId::new(3), None);
    assert_eq!(toggle.toggle().await, ToggleOutcome::Committed(true));

    let favorites = storefront.favorites().list().await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].id, BookId::new(3));
    assert_eq!(favorites[0].is_favorite, Some(true));

    let page = storefront
        .catalog()
        .list_books(&apagina_storefront::catalog::BookQuery::default())
        .await
        .unwrap();
    let flags: Vec<_> = page
        .data
        .iter()
        .map(|b| (b.id.as_i32(), b.is_favorite))
        .collect();
    assert!(flags.contains(&(3, Some(true))));
    assert!(flags.contains(&(1, Some(false))));
}

#[tokio::test]
async fn test_guest_favorites_page_asks_for_login() {
    let backend = MockBackend::start().await.unwrap();
    let (storefront, _store) = backend.session().unwrap();
    storefront.init().await;

    let err = storefront.favorites().list().await.unwrap_err();
    assert_eq!(err.message(), "Faça login para ver seus favoritos.");
    assert_eq!(backend.request_count("GET /api/favorites"), 0);
}

#[tokio::test]
async fn test_cancelled_toggle_restores_and_accepts_next_press() {
    let backend = MockBackend::start().await.unwrap();
    let storefront = logged_in(&backend).await;
    backend.delay_favorites(Duration::from_millis(500));

    let toggle = storefront.favorite_toggle(BookId::new(4), Some(false));
    let cancelled = tokio::time::timeout(Duration::from_millis(50), toggle.toggle()).await;
    assert!(cancelled.is_err());

    assert!(!toggle.is_pending());
    assert!(!toggle.is_favorite());
    assert_eq!(toggle.state(), ToggleState::Settled(false));

    backend.delay_favorites(Duration::ZERO);
    assert_eq!(toggle.toggle().await, ToggleOutcome::Committed(true));
    assert!(toggle.is_favorite());
}
