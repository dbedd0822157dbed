//! Core types for cart and wishlist synchronization.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod identity;
pub mod item;
pub mod price;
pub mod status;

pub use id::*;
pub use identity::Identity;
pub use item::{CartItem, CollectionEntry, ProductDetails, WishlistItem};
pub use price::{PriceRange, effective_unit_price};
pub use status::*;
