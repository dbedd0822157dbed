//! Basket Sync library.
//!
//! Keeps a shopper's cart and wishlist mirrored locally while the Collection
//! Store holds the authoritative copy.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod store;

pub use config::{ConfigError, StoreConfig, SyncConfig};
pub use engine::{CartSync, EngineOptions, Snapshot, SyncEngine, WishlistSync};
pub use error::{MutationOutcome, Result, SyncError};
pub use identity::{GuestPolicy, IdentityProvider, IdentityResolver, SessionIdentity};
pub use store::{CollectionStore, HttpCollectionStore, InMemoryCollectionStore};
