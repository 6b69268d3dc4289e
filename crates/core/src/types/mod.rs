//! Core types for A Página.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod account;
pub mod book;
pub mod cart;
pub mod email;
pub mod id;
pub mod price;

pub use account::{FieldError, RegisterRequest, RegisterResult, User};
pub use book::{
    Book, BookDetails, BookPage, FavoriteBook, Genre, Pagination, Review, StarRating, clean_list,
};
pub use cart::{CartLineItem, NewCartItem, cart_item_count, cart_total};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
