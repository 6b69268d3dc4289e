//! Session state shared by every page of the storefront.

use std::sync::Arc;

use tracing::info;

use apagina_core::{BookId, RegisterResult, User};

use crate::api::ApiClient;
use crate::auth::AuthHolder;
use crate::cart::CartHolder;
use crate::catalog::CatalogService;
use crate::config::ClientConfig;
use crate::error::{ClientError, add_breadcrumb};
use crate::favorites::{FavoriteToggle, FavoritesService};
use crate::register::RegistrationForm;
use crate::search::BookSearch;
use crate::storage::{FileStore, KeyValueStore};

pub const CHECKOUT_DONE: &str = "Compra realizada com sucesso! Seu carrinho foi limpo.";
pub const CHECKOUT_FAILED: &str = "Erro ao finalizar a compra. Tente novamente.";

/// Result of finishing a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Completed,
    /// Nothing to buy; the cart was not touched.
    EmptyCart,
    Failed(String),
}

/// One shopper's session: storage, API client and the state holders, wired
/// together.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: ClientConfig,
    api: ApiClient,
    auth: AuthHolder,
    cart: CartHolder,
    catalog: CatalogService,
    favorites: FavoritesService,
}

impl Storefront {
    /// Create a session persisted to `config.storage_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let store = Arc::new(FileStore::new(config.storage_path.clone()));
        Self::with_store(config, store)
    }

    /// Create a session over any store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_store(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ClientError> {
        let api = ApiClient::new(&config, Arc::clone(&store))?;
        let auth = AuthHolder::new(api.clone(), Arc::clone(&store));
        let cart = CartHolder::new(api.clone(), auth.clone(), store);
        let catalog = CatalogService::new(api.clone());
        let favorites = FavoritesService::new(api.clone(), auth.clone());

        Ok(Self {
            inner: Arc::new(StorefrontInner {
                config,
                api,
                auth,
                cart,
                catalog,
                favorites,
            }),
        })
    }

    /// Restore the persisted session and load the matching cart.
    pub async fn init(&self) -> Option<User> {
        let user = self.inner.auth.init();
        self.inner.cart.sync_auth().await;
        user
    }

    /// Log in, then merge the guest cart into the account's cart.
    pub async fn login(&self, identifier: &str, secret: &str) -> bool {
        let success = self.inner.auth.login(identifier, secret).await;
        self.inner.cart.sync_auth().await;
        success
    }

    /// Log out and switch back to the guest cart.
    pub async fn logout(&self) {
        self.inner.auth.logout();
        self.inner.cart.sync_auth().await;
    }

    /// Validate the form locally, then create the account.
    pub async fn register(&self, form: &RegistrationForm) -> RegisterResult {
        match form.validate() {
            Ok(request) => self.inner.auth.register(&request).await,
            Err(errors) => RegisterResult::ValidationFailure(errors),
        }
    }

    /// Finish the purchase. There is no payment step: the cart is emptied.
    pub async fn checkout(&self) -> CheckoutOutcome {
        if self.inner.cart.items().is_empty() {
            return CheckoutOutcome::EmptyCart;
        }

        if self.inner.cart.clear_cart().await {
            add_breadcrumb("cart", "Checked out", None);
            info!("Checkout completed");
            CheckoutOutcome::Completed
        } else {
            CheckoutOutcome::Failed(CHECKOUT_FAILED.to_string())
        }
    }

    /// A favorite toggle for one book card.
    #[must_use]
    pub fn favorite_toggle(&self, book_id: BookId, initial: Option<bool>) -> FavoriteToggle {
        self.inner.favorites.toggle(book_id, initial)
    }

    /// A search box using the configured debounce window.
    #[must_use]
    pub fn book_search(&self) -> BookSearch {
        BookSearch::new(self.inner.api.clone(), self.inner.config.search_debounce)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn auth(&self) -> &AuthHolder {
        &self.inner.auth
    }

    #[must_use]
    pub fn cart(&self) -> &CartHolder {
        &self.inner.cart
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn favorites(&self) -> &FavoritesService {
        &self.inner.favorites
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn offline() -> Storefront {
        let config = ClientConfig::with_api_url("http://127.0.0.1:9/api").unwrap();
        Storefront::with_store(config, Arc::new(MemoryStore::new())).unwrap()
    }

    #[tokio::test]
    async fn test_register_with_one_book_skips_network() {
        let storefront = offline();
        let mut form = RegistrationForm::new();
        form.username = "leitora".to_string();
        form.email = "leitora@apagina.com.br".to_string();
        form.set_password("segredo");
        form.select_book(crate::register::BookChoice {
            id: BookId::new(1),
            title: "Dom Casmurro".to_string(),
        });
        form.toggle_genre(apagina_core::GenreId::new(1));

        // An offline backend would yield UnknownFailure if a request were made
        let result = storefront.register(&form).await;
        assert_eq!(
            result.messages(),
            vec![crate::register::BOOKS_REQUIRED.to_string()]
        );
    }

    #[tokio::test]
    async fn test_checkout_with_empty_cart() {
        let storefront = offline();
        storefront.init().await;
        assert_eq!(storefront.checkout().await, CheckoutOutcome::EmptyCart);
    }
}
