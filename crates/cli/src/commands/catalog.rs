//! Browsing: listings, book pages, search, genres and favorites.

use std::time::Duration;

use apagina_core::{Book, BookId, Price, StarRating};
use apagina_storefront::catalog::{BookQuery, format_review_date};
use apagina_storefront::favorites::{LOGIN_REQUIRED, ToggleOutcome};
use apagina_storefront::register::filter_genres;
use apagina_storefront::state::Storefront;

use super::CommandError;

fn log_book(book: &Book) {
    let favorite = if book.is_favorite == Some(true) { " ♥" } else { "" };
    tracing::info!(
        "[{}] {} - {} | {} | {}{favorite}",
        book.id,
        book.title,
        book.author_list().join(", "),
        Price::display_or_unavailable(book.price()),
        StarRating::new(book.average_score),
    );
}

pub async fn books(storefront: &Storefront, query: &BookQuery) -> Result<(), CommandError> {
    let page = storefront.catalog().list_books(query).await?;

    if page.data.is_empty() {
        tracing::info!("Nenhum livro encontrado.");
        return Ok(());
    }
    for book in &page.data {
        log_book(book);
    }

    let pagination = page.pagination;
    if let (Some(current), Some(total)) = (pagination.page, pagination.total_pages) {
        tracing::info!("Página {current} de {total}");
    }
    Ok(())
}

pub async fn book(storefront: &Storefront, id: BookId) -> Result<(), CommandError> {
    let page = storefront.catalog().book_with_reviews(id).await?;
    let details = &page.details;

    log_book(&details.book);
    if let Some(publisher) = &details.publisher {
        tracing::info!(
            "Editora: {publisher} ({})",
            details.published_date.as_deref().unwrap_or("s/d")
        );
    }
    let categories = details.book.category_list();
    if !categories.is_empty() {
        tracing::info!("Categorias: {}", categories.join(", "));
    }
    if let Some(description) = &details.description {
        tracing::info!("{description}");
    }

    if page.reviews.is_empty() {
        tracing::info!("Nenhuma avaliação ainda.");
    }
    for review in &page.reviews {
        tracing::info!(
            "{} em {} - {}: {}",
            review.profile_name.as_deref().unwrap_or("Anônimo"),
            format_review_date(review.reviewed_at()),
            StarRating::new(review.review_score),
            review
                .review_summary
                .as_deref()
                .or(review.review_text.as_deref())
                .unwrap_or_default(),
        );
    }
    Ok(())
}

/// Feed `terms` to a search box one at a time, then wait for the last one.
pub async fn search(
    storefront: &Storefront,
    terms: &[String],
    typing_ms: u64,
) -> Result<(), CommandError> {
    let search = storefront.book_search();
    let mut updates = search.subscribe();

    for term in terms {
        search.input(term);
        tokio::time::sleep(Duration::from_millis(typing_ms)).await;
    }

    // A closed channel cannot happen while `search` is alive
    let state = updates
        .wait_for(|state| !state.searching)
        .await
        .map(|state| state.clone())
        .unwrap_or_else(|_| search.current());

    if let Some(error) = state.error {
        return Err(CommandError::Failed(error));
    }
    if state.results.is_empty() {
        tracing::info!("Nenhum resultado para \"{}\".", state.term);
    }
    for book in &state.results {
        log_book(book);
    }
    Ok(())
}

pub async fn genres(storefront: &Storefront, filter: Option<&str>) -> Result<(), CommandError> {
    let genres = storefront.catalog().genres().await?;
    for genre in filter_genres(&genres, filter.unwrap_or_default()) {
        tracing::info!("[{}] {}", genre.id, genre.name);
    }
    Ok(())
}

pub async fn favorites(storefront: &Storefront) -> Result<(), CommandError> {
    let books = storefront.favorites().list().await?;
    if books.is_empty() {
        tracing::info!("Você ainda não tem favoritos.");
    }
    for book in &books {
        log_book(book);
    }
    Ok(())
}

/// Flip a book's favorite flag, starting from what the catalog reports.
pub async fn favorite(storefront: &Storefront, id: BookId) -> Result<(), CommandError> {
    let initial = if storefront.auth().is_authenticated() {
        storefront.catalog().book(id).await?.book.is_favorite
    } else {
        None
    };

    match storefront.favorite_toggle(id, initial).toggle().await {
        ToggleOutcome::Committed(true) => {
            tracing::info!("Adicionado aos favoritos.");
            Ok(())
        }
        ToggleOutcome::Committed(false) => {
            tracing::info!("Removido dos favoritos.");
            Ok(())
        }
        ToggleOutcome::RolledBack { message, .. } => Err(CommandError::Failed(message)),
        ToggleOutcome::LoginRequired => Err(CommandError::Failed(LOGIN_REQUIRED.to_string())),
        ToggleOutcome::Ignored => Ok(()),
    }
}
