//! A Página Core - Shared domain types.
//!
//! This crate provides the types shared by every A Página component:
//! - `storefront` - Client library (auth, cart and favorite state holders)
//! - `cli` - Command-line storefront built on the client library
//! - `integration-tests` - Mock backend and end-to-end tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no storage,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, emails, catalog, cart and account types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
