//! Basket Core - Shared cart and wishlist types.
//!
//! This crate provides the pieces of the cart/wishlist engine that need no I/O:
//! - `basket-sync` - Collection Store client and synchronization engine
//! - `basket-cli` - Command-line access to a Collection Store
//!
//! # Architecture
//!
//! The core crate contains only types, the local mirror, and pure derived
//! views - no HTTP clients, no async runtime. This keeps it lightweight and
//! allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, identities, prices, and collection entries
//! - [`mirror`] - Ordered, id-keyed local copy of a collection
//! - [`views`] - Counts, totals, and membership derived from a mirror

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod mirror;
pub mod types;
pub mod views;

pub use mirror::Mirror;
pub use types::*;
