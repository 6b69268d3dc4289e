//! Debounced book search.
//!
//! Each keystroke reschedules the search. Only a timer that runs out starts a
//! request; a request already sent is never cancelled, but its results are
//! dropped if the term has changed by the time they arrive.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, instrument};

use apagina_core::Book;

use crate::api::ApiClient;
use crate::error::report;

/// Shortest term that triggers a search.
pub const MIN_TERM_CHARS: usize = 2;

/// Results fetched per search.
pub const SEARCH_LIMIT: u32 = 10;

const SEARCH_FAILED: &str = "Falha ao buscar livros.";

// =============================================================================
// Debouncer
// =============================================================================

/// Cancels a scheduled task that has not fired yet.
#[derive(Debug, Clone)]
pub struct DebounceHandle {
    timer: AbortHandle,
}

impl DebounceHandle {
    /// Cancel the task if its timer is still running. No effect once fired.
    pub fn cancel(&self) {
        self.timer.abort();
    }

    /// Whether the timer has fired or been cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.timer.is_finished()
    }
}

/// Runs only the most recently scheduled task, once its delay passes
/// without another call to [`schedule`](Self::schedule).
///
/// Must be used inside a Tokio runtime.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Mutex<Option<DebounceHandle>>,
}

impl Debouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` after `delay`, cancelling any task still waiting.
    pub fn schedule<F>(&self, delay: Duration, work: F) -> DebounceHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detach the work so cancelling the timer later cannot abort it
            tokio::spawn(work);
        });
        let handle = DebounceHandle {
            timer: timer.abort_handle(),
        };

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        handle
    }

    /// Cancel the waiting task, if any.
    pub fn cancel(&self) {
        if let Some(pending) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pending.cancel();
        }
    }
}

// =============================================================================
// BookSearch
// =============================================================================

/// What a search box shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    /// The trimmed term last typed.
    pub term: String,
    pub results: Vec<Book>,
    /// A search for `term` is scheduled or in flight.
    pub searching: bool,
    pub error: Option<String>,
}

/// Search-as-you-type over the catalog.
pub struct BookSearch {
    api: ApiClient,
    delay: Duration,
    debouncer: Debouncer,
    state: Arc<watch::Sender<SearchState>>,
}

impl BookSearch {
    #[must_use]
    pub fn new(api: ApiClient, delay: Duration) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            api,
            delay,
            debouncer: Debouncer::new(),
            state: Arc::new(state),
        }
    }

    /// Watch the search state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    /// Snapshot of the search state.
    #[must_use]
    pub fn current(&self) -> SearchState {
        self.state.borrow().clone()
    }

    /// Handle a change of the search box.
    ///
    /// Terms shorter than [`MIN_TERM_CHARS`] clear the results at once.
    #[instrument(skip(self))]
    pub fn input(&self, term: &str) {
        let term = term.trim().to_string();

        if term.chars().count() < MIN_TERM_CHARS {
            self.debouncer.cancel();
            self.state.send_modify(|state| {
                *state = SearchState {
                    term,
                    ..SearchState::default()
                };
            });
            return;
        }

        self.state.send_modify(|state| {
            state.term.clone_from(&term);
            state.searching = true;
            state.error = None;
        });

        let api = self.api.clone();
        let state = Arc::clone(&self.state);
        self.debouncer.schedule(self.delay, async move {
            debug!(term = %term, "Sending debounced search");
            let result = api.list_books(Some(&term), Some(SEARCH_LIMIT), None).await;

            state.send_if_modified(|current| {
                if current.term != term {
                    return false;
                }
                match result {
                    Ok(page) => {
                        current.results = page.data;
                        current.error = None;
                    }
                    Err(e) => {
                        report("search", &e);
                        current.results.clear();
                        current.error = Some(SEARCH_FAILED.to_string());
                    }
                }
                current.searching = false;
                true
            });
        });
    }
}
