//! Collection Store clients.
//!
//! # Architecture
//!
//! - [`CollectionStore`] is the seam between the engine and persistence
//! - [`HttpCollectionStore`] talks to the remote store over its REST routes
//! - [`InMemoryCollectionStore`] keeps the same contract in process
//!
//! The store is the source of truth. Clients never cache; the engine's
//! mirror is the only local copy.
//!
//! # Routes
//!
//! ```text
//! GET    /collections/{name}?identity=<id>            -> { success, items }
//! POST   /collections/{name}/add                       -> { success, message?, item? }
//! PUT    /collections/{name}/update/{id}               -> { success }
//! DELETE /collections/{name}/remove/{id}?identity=<id> -> { success }
//! DELETE /collections/{name}/clear?identity=<id>       -> { success }
//! ```

mod http;
mod memory;

pub use http::HttpCollectionStore;
pub use memory::InMemoryCollectionStore;

use std::future::Future;

use basket_core::{CollectionEntry, CollectionKind, Identity, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Operations the engine needs from persistence.
///
/// Every call is scoped by an [`Identity`]; implementations must never let one
/// identity observe another's entries.
pub trait CollectionStore: Send + Sync + 'static {
    /// Fetch the full collection of `T` for `identity`.
    fn fetch<T: CollectionEntry>(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Vec<T>>> + Send;

    /// Add a product. Returns the stored entry when the store echoes it.
    ///
    /// `quantity` is `None` for collections without quantities.
    fn add<T: CollectionEntry>(
        &self,
        identity: &Identity,
        id: &ProductId,
        quantity: Option<u32>,
    ) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Set the quantity of a cart line. `quantity` is at least 1.
    fn update(
        &self,
        kind: CollectionKind,
        identity: &Identity,
        id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove a product.
    fn remove(
        &self,
        kind: CollectionKind,
        identity: &Identity,
        id: &ProductId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove every entry of the collection.
    fn clear(
        &self,
        kind: CollectionKind,
        identity: &Identity,
    ) -> impl Future<Output = Result<()>> + Send;
}

// =============================================================================
// Wire Types
// =============================================================================

/// Body of `POST /collections/{name}/add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    pub identity: String,
    pub id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

/// Body of `PUT /collections/{name}/update/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub identity: String,
    pub quantity: u32,
}

/// Response of `GET /collections/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Missing or null means the identity has no collection yet.
    #[serde(default = "Option::default")]
    pub items: Option<Vec<T>>,
}

/// Response of the add route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Canonical stored entry, when the store echoes it.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub item: Option<T>,
}

/// Response of update, remove, and clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    /// A successful response.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// A failed response with a message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}
