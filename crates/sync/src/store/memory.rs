//! In-process Collection Store.
//!
//! Implements the same contract as the remote store against a product
//! catalog held in memory: cart adds accumulate, wishlist adds are
//! idempotent, removes of absent products succeed, and every collection is
//! scoped by the identity string. Useful for local development and as the
//! backing store of test servers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use basket_core::{CollectionEntry, CollectionKind, Identity, ProductDetails, ProductId};
use chrono::{DateTime, Utc};
use tracing::instrument;

use super::CollectionStore;
use crate::error::{Result, SyncError};

const NOT_FOUND: u16 = 404;
const BAD_REQUEST: u16 = 400;

#[derive(Debug, Clone)]
struct StoredEntry {
    product: ProductDetails,
    quantity: u32,
    added_at: DateTime<Utc>,
}

impl StoredEntry {
    fn to_entry<T: CollectionEntry>(&self) -> T {
        T::from_product(self.product.clone(), self.quantity, self.added_at)
    }
}

type CollectionKey = (CollectionKind, String);

/// Collection Store backed by process memory.
///
/// Cheap to clone; clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryCollectionStore {
    inner: Arc<InMemoryInner>,
}

#[derive(Default)]
struct InMemoryInner {
    catalog: Mutex<HashMap<ProductId, ProductDetails>>,
    collections: Mutex<HashMap<CollectionKey, Vec<StoredEntry>>>,
    unavailable: AtomicBool,
    requests: AtomicUsize,
}

impl InMemoryCollectionStore {
    /// Create an empty store with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose catalog holds `products`.
    #[must_use]
    pub fn with_catalog(products: impl IntoIterator<Item = ProductDetails>) -> Self {
        let store = Self::new();
        for product in products {
            store.insert_product(product);
        }
        store
    }

    /// Add or replace a catalog product.
    pub fn insert_product(&self, product: ProductDetails) {
        self.catalog().insert(product.id.clone(), product);
    }

    /// Simulate an outage: while unavailable every call fails with
    /// [`SyncError::Transport`].
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of operations received, including failed ones.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }

    /// Entries of `T` stored for `identity`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transport`] while the store is unavailable.
    pub fn entries<T: CollectionEntry>(&self, identity: &str) -> Result<Vec<T>> {
        self.begin()?;
        Ok(self
            .collections()
            .get(&(T::KIND, identity.to_string()))
            .map(|entries| entries.iter().map(StoredEntry::to_entry::<T>).collect())
            .unwrap_or_default())
    }

    /// Add a catalog product and return the stored entry.
    ///
    /// # Errors
    ///
    /// Rejects unknown products and zero quantities.
    pub fn add_entry<T: CollectionEntry>(
        &self,
        identity: &str,
        id: &ProductId,
        quantity: Option<u32>,
    ) -> Result<T> {
        self.begin()?;
        let quantity = quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(rejected(BAD_REQUEST, "Quantity must be at least 1"));
        }
        let product = self
            .catalog()
            .get(id)
            .cloned()
            .ok_or_else(|| rejected(NOT_FOUND, "Product not found"))?;

        let mut collections = self.collections();
        let entries = collections
            .entry((T::KIND, identity.to_string()))
            .or_default();

        if let Some(existing) = entries.iter_mut().find(|e| &e.product.id == id) {
            if T::KIND.has_quantity() {
                existing.quantity = existing.quantity.saturating_add(quantity);
            }
            return Ok(existing.to_entry());
        }

        let stored = StoredEntry {
            product,
            quantity: if T::KIND.has_quantity() { quantity } else { 1 },
            added_at: Utc::now(),
        };
        let entry = stored.to_entry();
        entries.push(stored);
        Ok(entry)
    }

    /// Set the quantity of a stored cart line.
    ///
    /// # Errors
    ///
    /// Rejects collections without quantities, zero quantities, and products
    /// not in the collection.
    pub fn update_entry(
        &self,
        kind: CollectionKind,
        identity: &str,
        id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        self.begin()?;
        if !kind.has_quantity() {
            return Err(rejected(BAD_REQUEST, "Collection has no quantities"));
        }
        if quantity == 0 {
            return Err(rejected(BAD_REQUEST, "Quantity must be at least 1"));
        }

        let mut collections = self.collections();
        let entry = collections
            .get_mut(&(kind, identity.to_string()))
            .and_then(|entries| entries.iter_mut().find(|e| &e.product.id == id))
            .ok_or_else(|| rejected(NOT_FOUND, format!("Item not found in {kind}")))?;
        entry.quantity = quantity;
        Ok(())
    }

    /// Remove a product. Absent products are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transport`] while the store is unavailable.
    pub fn remove_entry(&self, kind: CollectionKind, identity: &str, id: &ProductId) -> Result<()> {
        self.begin()?;
        if let Some(entries) = self.collections().get_mut(&(kind, identity.to_string())) {
            entries.retain(|e| &e.product.id != id);
        }
        Ok(())
    }

    /// Remove every entry of a collection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transport`] while the store is unavailable.
    pub fn clear_entries(&self, kind: CollectionKind, identity: &str) -> Result<()> {
        self.begin()?;
        self.collections().remove(&(kind, identity.to_string()));
        Ok(())
    }

    fn begin(&self) -> Result<()> {
        self.inner.requests.fetch_add(1, Ordering::SeqCst);
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::Transport(
                "collection store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn catalog(&self) -> MutexGuard<'_, HashMap<ProductId, ProductDetails>> {
        self.inner
            .catalog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn collections(&self) -> MutexGuard<'_, HashMap<CollectionKey, Vec<StoredEntry>>> {
        self.inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn rejected(status: u16, message: impl Into<String>) -> SyncError {
    SyncError::Rejected {
        status,
        message: message.into(),
    }
}

impl CollectionStore for InMemoryCollectionStore {
    #[instrument(skip(self), fields(collection = %T::KIND, identity = %identity))]
    async fn fetch<T: CollectionEntry>(&self, identity: &Identity) -> Result<Vec<T>> {
        self.entries(identity.as_str())
    }

    #[instrument(skip(self), fields(collection = %T::KIND, identity = %identity, product_id = %id))]
    async fn add<T: CollectionEntry>(
        &self,
        identity: &Identity,
        id: &ProductId,
        quantity: Option<u32>,
    ) -> Result<Option<T>> {
        self.add_entry(identity.as_str(), id, quantity).map(Some)
    }

    #[instrument(skip(self), fields(collection = %kind, identity = %identity, product_id = %id))]
    async fn update(
        &self,
        kind: CollectionKind,
        identity: &Identity,
        id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        self.update_entry(kind, identity.as_str(), id, quantity)
    }

    #[instrument(skip(self), fields(collection = %kind, identity = %identity, product_id = %id))]
    async fn remove(&self, kind: CollectionKind, identity: &Identity, id: &ProductId) -> Result<()> {
        self.remove_entry(kind, identity.as_str(), id)
    }

    #[instrument(skip(self), fields(collection = %kind, identity = %identity))]
    async fn clear(&self, kind: CollectionKind, identity: &Identity) -> Result<()> {
        self.clear_entries(kind, identity.as_str())
    }
}
