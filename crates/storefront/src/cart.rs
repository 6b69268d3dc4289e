//! Cart state holder.
//!
//! A session's cart lives in one of two places. A guest cart is a JSON list
//! under [`LOCAL_CART_KEY`]; an authenticated cart lives on the server and
//! every response to a cart call is the whole new cart. The holder picks the
//! target per operation from the auth holder, and reconciles the two once,
//! when a guest logs in, by replaying the guest lines as increments.
//!
//! On the authenticated path nothing changes locally until the server
//! answers. Two overlapping calls are not de-duplicated: each response
//! replaces the cart as it arrives.

use std::sync::{Arc, RwLock};

use tracing::{info, instrument, warn};

use apagina_core::{
    BookId, CartLineItem, NewCartItem, Price, UserId, cart_item_count, cart_total,
};

use crate::api::{ApiClient, ApiError};
use crate::auth::{AuthHolder, AuthMode};
use crate::error::{add_breadcrumb, report};
use crate::guard::{self, InFlight};
use crate::storage::{KeyValueStore, LOCAL_CART_KEY, StorageError};

const LOAD_FAILED: &str = "Falha ao carregar carrinho.";
const ADD_FAILED: &str = "Falha ao adicionar.";
const INCREASE_FAILED: &str = "Falha ao aumentar qtd.";
const DECREASE_FAILED: &str = "Falha ao diminuir qtd.";
const REMOVE_FAILED: &str = "Falha ao remover item.";
const CLEAR_FAILED: &str = "Falha ao limpar carrinho.";
const MERGE_FAILED: &str = "Falha ao mesclar carrinho local com o servidor.";

/// Owns the shopper's cart.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CartHolder {
    inner: Arc<CartInner>,
}

struct CartInner {
    api: ApiClient,
    auth: AuthHolder,
    store: Arc<dyn KeyValueStore>,
    state: RwLock<CartState>,
    in_flight: InFlight,
}

#[derive(Default)]
struct CartState {
    items: Vec<CartLineItem>,
    error: Option<String>,
    /// Identity the cart was last synchronised with: `Some(None)` for a
    /// guest, `Some(Some(user))` for a signed-in user. `None` until the first
    /// [`CartHolder::sync_auth`].
    synced: Option<Option<UserId>>,
}

/// What a guest-cart edit did.
enum LocalEdit {
    Changed,
    Unchanged,
}

impl CartHolder {
    /// Create an empty holder. Call [`sync_auth`](Self::sync_auth) (or
    /// [`load_cart`](Self::load_cart)) to populate it.
    #[must_use]
    pub fn new(api: ApiClient, auth: AuthHolder, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(CartInner {
                api,
                auth,
                store,
                state: RwLock::new(CartState::default()),
                in_flight: InFlight::default(),
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current line items.
    #[must_use]
    pub fn items(&self) -> Vec<CartLineItem> {
        guard::read(&self.inner.state).items.clone()
    }

    /// Number of books (sum of quantities).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        cart_item_count(&guard::read(&self.inner.state).items)
    }

    #[must_use]
    pub fn total(&self) -> Price {
        cart_total(&guard::read(&self.inner.state).items)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.in_flight.is_active()
    }

    /// Message describing the last failed operation.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        guard::read(&self.inner.state).error.clone()
    }

    // =========================================================================
    // Loading and Synchronisation
    // =========================================================================

    /// Reload from the store that applies to the current auth mode.
    ///
    /// A failed server load leaves the cart empty. A missing or unreadable
    /// guest cart is an empty cart, not an error.
    #[instrument(skip(self))]
    pub async fn load_cart(&self) -> bool {
        let _loading = self.inner.in_flight.start();
        self.clear_error();
        self.reload().await
    }

    async fn reload(&self) -> bool {
        match self.inner.auth.mode() {
            AuthMode::Authenticated => match self.inner.api.get_cart().await {
                Ok(items) => {
                    self.replace_items(items);
                    true
                }
                Err(e) => {
                    report("load_cart", &e);
                    let mut state = guard::write(&self.inner.state);
                    state.items.clear();
                    state.error = Some(LOAD_FAILED.to_string());
                    false
                }
            },
            AuthMode::Guest => {
                let items = self.read_local();
                self.replace_items(items);
                true
            }
        }
    }

    /// Follow the auth holder into its current identity.
    ///
    /// A guest becoming authenticated merges the guest cart into the server
    /// cart. Logging out switches back to the guest cart without copying
    /// anything, and signing in as a different user loads that user's server
    /// cart. Anything else just loads the applicable cart, and an unchanged
    /// identity does nothing.
    #[instrument(skip(self))]
    pub async fn sync_auth(&self) -> bool {
        let observed = self.inner.auth.user().map(|user| user.id);
        let previous = guard::write(&self.inner.state).synced.replace(observed);

        match (previous, observed) {
            (Some(previous), observed) if previous == observed => true,
            (Some(None), Some(_)) => {
                info!("Session authenticated; merging guest cart");
                self.merge_local_cart_to_db().await
            }
            (Some(Some(_)), None) => {
                info!("Session ended; switching to guest cart");
                self.load_cart().await
            }
            (Some(Some(_)), Some(user)) => {
                info!(user_id = %user, "Account changed; loading its cart");
                self.load_cart().await
            }
            _ => self.load_cart().await,
        }
    }

    /// Drain the guest cart into the server cart.
    ///
    /// Lines are sent one at a time as increments carrying their quantity;
    /// the server sums them with whatever it already holds. When every line
    /// is accepted the guest cart is deleted and the server cart reloaded.
    ///
    /// If a line is rejected, the lines already sent stay on the server and
    /// only the rejected line and those after it are written back to the guest
    /// cart, so a later merge does not count anything twice. The server cart
    /// is still reloaded so the shopper sees what did get through.
    #[instrument(skip(self))]
    pub async fn merge_local_cart_to_db(&self) -> bool {
        if self.inner.auth.mode() != AuthMode::Authenticated {
            return false;
        }

        let _loading = self.inner.in_flight.start();
        self.clear_error();

        let local = self.read_local();
        if local.is_empty() {
            self.discard_local();
            return self.reload().await;
        }

        info!(lines = local.len(), "Merging guest cart into server cart");

        for (index, line) in local.iter().enumerate() {
            if let Err(e) = self.inner.api.add_to_cart(line.id, line.quantity).await {
                report("merge_cart", &e);
                let unapplied = local.get(index..).unwrap_or_default();
                warn!(
                    book_id = %line.id,
                    applied = index,
                    remaining = unapplied.len(),
                    "Guest cart merge stopped"
                );

                if let Err(e) = self.write_local(unapplied) {
                    warn!(error = %e, "Could not keep unmerged guest lines");
                }

                self.reload().await;
                guard::write(&self.inner.state).error = Some(MERGE_FAILED.to_string());
                return false;
            }
        }

        let discarded = self.discard_local();
        add_breadcrumb("cart", "Merged guest cart", None);
        info!("Guest cart merged");
        let reloaded = self.reload().await;
        if !discarded {
            guard::write(&self.inner.state).error = Some(MERGE_FAILED.to_string());
            return false;
        }
        reloaded
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one copy of a book.
    #[instrument(skip(self, item), fields(book_id = %item.id))]
    pub async fn add_to_cart(&self, item: NewCartItem) -> bool {
        let _loading = self.inner.in_flight.start();
        self.clear_error();

        match self.inner.auth.mode() {
            AuthMode::Authenticated => {
                let result = self.inner.api.add_to_cart(item.id, 1).await;
                self.apply_server("add_to_cart", ADD_FAILED, result)
            }
            AuthMode::Guest => self.edit_local(ADD_FAILED, |items| {
                match items.iter_mut().find(|line| line.id == item.id) {
                    Some(line) => line.quantity = line.quantity.saturating_add(1),
                    None => items.push(item.into_line()),
                }
                LocalEdit::Changed
            }),
        }
    }

    /// Add one more copy of a book already in the cart.
    #[instrument(skip(self))]
    pub async fn increase_quantity(&self, book_id: BookId) -> bool {
        let _loading = self.inner.in_flight.start();
        self.clear_error();

        match self.inner.auth.mode() {
            AuthMode::Authenticated => {
                let result = self.inner.api.add_to_cart(book_id, 1).await;
                self.apply_server("increase_quantity", INCREASE_FAILED, result)
            }
            AuthMode::Guest => self.edit_local(INCREASE_FAILED, |items| {
                match items.iter_mut().find(|line| line.id == book_id) {
                    Some(line) => {
                        line.quantity = line.quantity.saturating_add(1);
                        LocalEdit::Changed
                    }
                    None => LocalEdit::Unchanged,
                }
            }),
        }
    }

    /// Remove one copy of a book. A line with a single copy is removed.
    /// Does nothing for a book that is not in the cart.
    #[instrument(skip(self))]
    pub async fn decrease_quantity(&self, book_id: BookId) -> bool {
        let current = match self.inner.auth.mode() {
            AuthMode::Authenticated => guard::read(&self.inner.state)
                .items
                .iter()
                .find(|line| line.id == book_id)
                .map(|line| line.quantity),
            AuthMode::Guest => self
                .read_local()
                .iter()
                .find(|line| line.id == book_id)
                .map(|line| line.quantity),
        };

        let Some(quantity) = current else {
            return false;
        };
        if quantity <= 1 {
            return self.remove_from_cart(book_id).await;
        }

        let _loading = self.inner.in_flight.start();
        self.clear_error();

        match self.inner.auth.mode() {
            AuthMode::Authenticated => {
                let result = self.inner.api.update_cart_item(book_id, quantity - 1).await;
                self.apply_server("decrease_quantity", DECREASE_FAILED, result)
            }
            AuthMode::Guest => self.edit_local(DECREASE_FAILED, |items| {
                match items.iter_mut().find(|line| line.id == book_id) {
                    Some(line) if line.quantity > 1 => {
                        line.quantity -= 1;
                        LocalEdit::Changed
                    }
                    Some(_) => {
                        items.retain(|line| line.id != book_id);
                        LocalEdit::Changed
                    }
                    None => LocalEdit::Unchanged,
                }
            }),
        }
    }

    /// Remove a book's line entirely.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, book_id: BookId) -> bool {
        let _loading = self.inner.in_flight.start();
        self.clear_error();

        match self.inner.auth.mode() {
            AuthMode::Authenticated => {
                let result = self.inner.api.remove_cart_item(book_id).await;
                self.apply_server("remove_from_cart", REMOVE_FAILED, result)
            }
            AuthMode::Guest => self.edit_local(REMOVE_FAILED, |items| {
                items.retain(|line| line.id != book_id);
                LocalEdit::Changed
            }),
        }
    }

    /// Empty the cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> bool {
        let _loading = self.inner.in_flight.start();
        self.clear_error();

        match self.inner.auth.mode() {
            AuthMode::Authenticated => {
                let result = self.inner.api.clear_cart().await.map(|()| Vec::new());
                self.apply_server("clear_cart", CLEAR_FAILED, result)
            }
            AuthMode::Guest => self.edit_local(CLEAR_FAILED, |items| {
                items.clear();
                LocalEdit::Changed
            }),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn clear_error(&self) {
        guard::write(&self.inner.state).error = None;
    }

    fn replace_items(&self, items: Vec<CartLineItem>) {
        guard::write(&self.inner.state).items = items;
    }

    /// Commit a server response, or record the failure and keep the cart.
    fn apply_server(
        &self,
        action: &str,
        failure: &str,
        result: Result<Vec<CartLineItem>, ApiError>,
    ) -> bool {
        match result {
            Ok(items) => {
                self.replace_items(items);
                true
            }
            Err(e) => {
                report(action, &e);
                guard::write(&self.inner.state).error = Some(failure.to_string());
                false
            }
        }
    }

    /// Read-modify-persist the guest cart. In-memory state changes only after
    /// the write succeeds.
    fn edit_local(
        &self,
        failure: &str,
        edit: impl FnOnce(&mut Vec<CartLineItem>) -> LocalEdit,
    ) -> bool {
        // The write lock serialises concurrent guest edits end to end
        let mut state = guard::write(&self.inner.state);
        let mut items = self.read_local();

        if matches!(edit(&mut items), LocalEdit::Unchanged) {
            return false;
        }

        match self.write_local(&items) {
            Ok(()) => {
                state.items = items;
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not persist guest cart");
                state.error = Some(failure.to_string());
                false
            }
        }
    }

    fn read_local(&self) -> Vec<CartLineItem> {
        let raw = match self.inner.store.get(LOCAL_CART_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Could not read guest cart");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<CartLineItem>>(&raw) {
            Ok(mut items) => {
                items.retain(|line| line.quantity > 0);
                items
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable guest cart");
                Vec::new()
            }
        }
    }

    fn write_local(&self, items: &[CartLineItem]) -> Result<(), StorageError> {
        let json = serde_json::to_string(items)?;
        self.inner.store.set(LOCAL_CART_KEY, &json)
    }

    /// Drop the guest cart after a merge. Falls back to writing an empty
    /// cart when the key cannot be removed; `false` if neither worked and the
    /// merged lines are still stored.
    fn discard_local(&self) -> bool {
        let Err(e) = self.inner.store.remove(LOCAL_CART_KEY) else {
            return true;
        };
        warn!(error = %e, "Could not remove guest cart; emptying it instead");

        match self.write_local(&[]) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Merged guest cart is still stored");
                false
            }
        }
    }
}
