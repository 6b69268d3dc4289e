//! Cache types for catalog responses.

use apagina_core::Genre;

/// Cache key for catalog data that rarely changes.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Genres,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Genres(Vec<Genre>),
}
