//! Subcommand implementations.
//!
//! Each command logs its result through `tracing` and returns a
//! [`CommandError`] carrying the message the storefront would show inline.

pub mod account;
pub mod cart;
pub mod catalog;

use thiserror::Error;

use apagina_storefront::catalog::PageError;

/// Errors that end a command with a non-zero exit.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The storefront refused the action; the message is user-facing.
    #[error("{0}")]
    Failed(String),

    /// A page could not be loaded.
    #[error(transparent)]
    Page(#[from] PageError),
}

impl CommandError {
    /// Use the holder's last error, or `fallback` if it recorded none.
    pub fn from_last_error(last_error: Option<String>, fallback: &str) -> Self {
        Self::Failed(last_error.unwrap_or_else(|| fallback.to_string()))
    }
}
