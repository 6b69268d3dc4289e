//! A Página storefront client library.
//!
//! State holders for the bookstore's shopper-facing flows: who is signed in,
//! what is in the cart, which books are favorites. They sit between any
//! presentation layer and the REST backend, and are built from an
//! [`ApiClient`](api::ApiClient) and a [`KeyValueStore`](storage::KeyValueStore).
//!
//! ```rust,ignore
//! use apagina_storefront::{config::ClientConfig, state::Storefront};
//!
//! let storefront = Storefront::new(ClientConfig::from_env()?)?;
//! storefront.init().await;
//! storefront.login("leitora", "segredo").await;
//! println!("{} itens", storefront.cart().item_count());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod credential;
pub mod error;
pub mod favorites;
mod guard;
pub mod register;
pub mod search;
pub mod state;
pub mod storage;
