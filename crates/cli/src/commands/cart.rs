//! Cart commands. They work the same for guests and logged-in shoppers.

use apagina_core::BookId;
use apagina_storefront::state::{CHECKOUT_DONE, CheckoutOutcome, Storefront};

use super::CommandError;

pub fn show(storefront: &Storefront) {
    let cart = storefront.cart();
    if let Some(message) = cart.last_error() {
        tracing::warn!("{message}");
    }

    let items = cart.items();
    if items.is_empty() {
        tracing::info!("Seu carrinho está vazio.");
        return;
    }
    for item in &items {
        tracing::info!(
            "[{}] {} x{} - {}",
            item.id,
            item.title,
            item.quantity,
            item.line_total()
        );
    }
    tracing::info!("{} item(s), total {}", cart.item_count(), cart.total());
}

/// Look the book up in the catalog, then add one copy.
pub async fn add(storefront: &Storefront, id: BookId) -> Result<(), CommandError> {
    let details = storefront.catalog().book(id).await?;
    let item = details.book.cart_item();

    if !storefront.cart().add_to_cart(item).await {
        return Err(failure(storefront, "Falha ao adicionar."));
    }
    tracing::info!("\"{}\" adicionado ao carrinho.", details.book.title);
    show(storefront);
    Ok(())
}

pub async fn increase(storefront: &Storefront, id: BookId) -> Result<(), CommandError> {
    if !storefront.cart().increase_quantity(id).await {
        return Err(failure(storefront, "Item não está no carrinho."));
    }
    show(storefront);
    Ok(())
}

pub async fn decrease(storefront: &Storefront, id: BookId) -> Result<(), CommandError> {
    if !storefront.cart().decrease_quantity(id).await {
        return Err(failure(storefront, "Item não está no carrinho."));
    }
    show(storefront);
    Ok(())
}

pub async fn remove(storefront: &Storefront, id: BookId) -> Result<(), CommandError> {
    if !storefront.cart().remove_from_cart(id).await {
        return Err(failure(storefront, "Falha ao remover item."));
    }
    show(storefront);
    Ok(())
}

pub async fn clear(storefront: &Storefront) -> Result<(), CommandError> {
    if !storefront.cart().clear_cart().await {
        return Err(failure(storefront, "Falha ao limpar carrinho."));
    }
    show(storefront);
    Ok(())
}

pub async fn checkout(storefront: &Storefront) -> Result<(), CommandError> {
    match storefront.checkout().await {
        CheckoutOutcome::Completed => {
            tracing::info!("{CHECKOUT_DONE}");
            Ok(())
        }
        CheckoutOutcome::EmptyCart => {
            tracing::info!("Seu carrinho está vazio.");
            Ok(())
        }
        CheckoutOutcome::Failed(message) => Err(CommandError::Failed(message)),
    }
}

fn failure(storefront: &Storefront, fallback: &str) -> CommandError {
    CommandError::from_last_error(storefront.cart().last_error(), fallback)
}
