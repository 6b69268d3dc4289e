//! Favorite books: the listing and the per-book optimistic toggle.
//!
//! A toggle flips its visible state as soon as it is pressed, then asks the
//! backend. If the backend refuses, the visible state goes back to what it
//! was. While its own request is outstanding a toggle ignores further
//! presses.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, instrument};

use apagina_core::{BookId, FavoriteBook};

use crate::api::ApiClient;
use crate::auth::AuthHolder;
use crate::catalog::PageError;
use crate::error::report;

pub const LOGIN_REQUIRED: &str = "Faça login para adicionar aos favoritos.";
pub const TOGGLE_FAILED: &str = "Erro ao atualizar favoritos. Tente novamente.";
const LIST_LOGIN_REQUIRED: &str = "Faça login para ver seus favoritos.";
const LIST_FAILED: &str = "Falha ao carregar favoritos.";

// =============================================================================
// ToggleState
// =============================================================================

/// Where a toggle is in its optimistic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    /// No request outstanding; the value is what the backend last agreed to.
    Settled(bool),
    /// A request is outstanding and `speculative` is already shown.
    Pending { original: bool, speculative: bool },
}

impl ToggleState {
    /// The value a shopper sees.
    #[must_use]
    pub const fn visible(self) -> bool {
        match self {
            Self::Settled(value) => value,
            Self::Pending { speculative, .. } => speculative,
        }
    }

    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Start a flip. `None` while another flip is outstanding.
    #[must_use]
    pub const fn begin(self) -> Option<Self> {
        match self {
            Self::Settled(value) => Some(Self::Pending {
                original: value,
                speculative: !value,
            }),
            Self::Pending { .. } => None,
        }
    }

    /// The backend accepted the flip.
    #[must_use]
    pub const fn commit(self) -> Self {
        match self {
            Self::Pending { speculative, .. } => Self::Settled(speculative),
            settled @ Self::Settled(_) => settled,
        }
    }

    /// The backend refused the flip.
    #[must_use]
    pub const fn rollback(self) -> Self {
        match self {
            Self::Pending { original, .. } => Self::Settled(original),
            settled @ Self::Settled(_) => settled,
        }
    }
}

/// Result of pressing a toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// No identity; nothing changed.
    LoginRequired,
    /// A request for this book was already outstanding.
    Ignored,
    /// The backend now agrees with the new value.
    Committed(bool),
    /// The backend refused; `restored` is shown again.
    RolledBack { restored: bool, message: String },
}

// =============================================================================
// FavoriteToggle
// =============================================================================

/// Optimistic favorite switch for one book.
///
/// Cheap to clone; clones share state, so a second handle sees the pending
/// request of the first.
#[derive(Clone)]
pub struct FavoriteToggle {
    inner: Arc<ToggleInner>,
}

struct ToggleInner {
    book_id: BookId,
    api: ApiClient,
    auth: AuthHolder,
    state: Mutex<(ToggleState, Option<String>)>,
}

impl FavoriteToggle {
    /// A toggle seeded from the catalog's `is_favorite` (absent means no).
    #[must_use]
    pub fn new(book_id: BookId, initial: Option<bool>, api: ApiClient, auth: AuthHolder) -> Self {
        Self {
            inner: Arc::new(ToggleInner {
                book_id,
                api,
                auth,
                state: Mutex::new((ToggleState::Settled(initial.unwrap_or(false)), None)),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, (ToggleState, Option<String>)> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn book_id(&self) -> BookId {
        self.inner.book_id
    }

    #[must_use]
    pub fn is_favorite(&self) -> bool {
        self.lock().0.visible()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.lock().0.is_pending()
    }

    #[must_use]
    pub fn state(&self) -> ToggleState {
        self.lock().0
    }

    /// Message from the last refused or rejected press.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().1.clone()
    }

    /// Re-seed from fresh catalog data. Ignored while a request is pending.
    pub fn sync_initial(&self, initial: Option<bool>) {
        let mut guard = self.lock();
        if !guard.0.is_pending() {
            guard.0 = ToggleState::Settled(initial.unwrap_or(false));
        }
    }

    /// Flip the favorite.
    #[instrument(skip(self), fields(book_id = %self.inner.book_id))]
    pub async fn toggle(&self) -> ToggleOutcome {
        if !self.inner.auth.is_authenticated() {
            self.lock().1 = Some(LOGIN_REQUIRED.to_string());
            return ToggleOutcome::LoginRequired;
        }

        let speculative = {
            let mut guard = self.lock();
            let Some(pending) = guard.0.begin() else {
                debug!("Favorite request already outstanding");
                return ToggleOutcome::Ignored;
            };
            guard.0 = pending;
            guard.1 = None;
            pending.visible()
        };

        let mut abandoned = AbandonGuard {
            toggle: self,
            armed: true,
        };

        let result = if speculative {
            self.inner.api.add_favorite(self.inner.book_id).await
        } else {
            self.inner.api.remove_favorite(self.inner.book_id).await
        };

        abandoned.armed = false;
        let mut guard = self.lock();
        match result {
            Ok(()) => {
                guard.0 = guard.0.commit();
                ToggleOutcome::Committed(guard.0.visible())
            }
            Err(e) => {
                report("toggle_favorite", &e);
                guard.0 = guard.0.rollback();
                guard.1 = Some(TOGGLE_FAILED.to_string());
                ToggleOutcome::RolledBack {
                    restored: guard.0.visible(),
                    message: TOGGLE_FAILED.to_string(),
                }
            }
        }
    }
}

/// Rolls a pending toggle back if its `toggle()` future is dropped before
/// the response is applied.
struct AbandonGuard<'a> {
    toggle: &'a FavoriteToggle,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut guard = self.toggle.lock();
        if guard.0.is_pending() {
            debug!("Favorite request abandoned; restoring previous value");
            guard.0 = guard.0.rollback();
        }
    }
}

// =============================================================================
// FavoritesService
// =============================================================================

/// Entry point for favorites: the listing page and toggles for book cards.
#[derive(Clone)]
pub struct FavoritesService {
    api: ApiClient,
    auth: AuthHolder,
}

impl FavoritesService {
    #[must_use]
    pub const fn new(api: ApiClient, auth: AuthHolder) -> Self {
        Self { api, auth }
    }

    /// The signed-in user's favorite books.
    ///
    /// # Errors
    ///
    /// Returns a `PageError` without an identity or if the fetch fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<FavoriteBook>, PageError> {
        if !self.auth.is_authenticated() {
            return Err(PageError::local(LIST_LOGIN_REQUIRED));
        }

        self.api.get_favorites().await.map_err(|e| {
            report("list_favorites", &e);
            PageError::from_api(LIST_FAILED, e)
        })
    }

    /// A toggle for one book card.
    #[must_use]
    pub fn toggle(&self, book_id: BookId, initial: Option<bool>) -> FavoriteToggle {
        FavoriteToggle::new(book_id, initial, self.api.clone(), self.auth.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::MemoryStore;

    fn guest_service() -> FavoritesService {
        let store = Arc::new(MemoryStore::new());
        let config = ClientConfig::with_api_url("http://127.0.0.1:9/api").unwrap();
        let api = ApiClient::new(&config, store.clone()).unwrap();
        let auth = AuthHolder::new(api.clone(), store);
        FavoritesService::new(api, auth)
    }

    #[test]
    fn test_state_machine_commit() {
        let pending = ToggleState::Settled(false).begin().unwrap();
        assert_eq!(
            pending,
            ToggleState::Pending {
                original: false,
                speculative: true
            }
        );
        assert!(pending.visible());
        assert_eq!(pending.commit(), ToggleState::Settled(true));
    }

    #[test]
    fn test_state_machine_rollback() {
        let pending = ToggleState::Settled(true).begin().unwrap();
        assert!(!pending.visible());
        assert_eq!(pending.rollback(), ToggleState::Settled(true));
    }

    #[test]
    fn test_pending_rejects_second_begin() {
        let pending = ToggleState::Settled(false).begin().unwrap();
        assert_eq!(pending.begin(), None);
        assert_eq!(ToggleState::Settled(true).commit(), ToggleState::Settled(true));
    }

    #[tokio::test]
    async fn test_toggle_without_identity_changes_nothing() {
        let toggle = guest_service().toggle(BookId::new(1), Some(false));

        assert_eq!(toggle.toggle().await, ToggleOutcome::LoginRequired);
        assert!(!toggle.is_favorite());
        assert!(!toggle.is_pending());
        assert_eq!(toggle.last_error().as_deref(), Some(LOGIN_REQUIRED));
    }

    #[tokio::test]
    async fn test_list_without_identity() {
        let err = guest_service().list().await.unwrap_err();
        assert_eq!(err.message(), LIST_LOGIN_REQUIRED);
    }

    #[test]
    fn test_sync_initial() {
        let toggle = guest_service().toggle(BookId::new(2), None);
        assert!(!toggle.is_favorite());

        toggle.sync_initial(Some(true));
        assert!(toggle.is_favorite());
    }
}
