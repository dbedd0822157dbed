//! Status enums for collections and their local mirrors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A collection name that is neither `cart` nor `wishlist`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown collection: {0}")]
pub struct UnknownCollection(pub String);

/// Which per-buyer collection an operation targets.
///
/// The string form is the `{name}` path segment of the Collection Store API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Cart,
    Wishlist,
}

impl CollectionKind {
    /// Path segment used by the Collection Store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Wishlist => "wishlist",
        }
    }

    /// Whether entries of this collection carry a quantity.
    #[must_use]
    pub const fn has_quantity(&self) -> bool {
        matches!(self, Self::Cart)
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CollectionKind {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cart" => Ok(Self::Cart),
            "wishlist" => Ok(Self::Wishlist),
            _ => Err(UnknownCollection(s.to_string())),
        }
    }
}

/// Lifecycle of a local mirror for the identity it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Nothing fetched yet for the bound identity.
    #[default]
    Uninitialized,
    /// A fetch is in flight and no fetch has completed yet.
    Fetching,
    /// At least one fetch has settled for the bound identity.
    Ready,
}
