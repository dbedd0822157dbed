//! Wishlist synchronization.
//!
//! Adding a product that is already saved is a successful no-op: the store
//! is not called and the mirror is unchanged.

use std::sync::Arc;

use basket_core::{
    CollectionEntry, CollectionKind, Identity, ProductDetails, ProductId, WishlistItem, views,
};
use chrono::Utc;
use tracing::{debug, instrument};

use super::collection::{Shared, Snapshot, SyncedCollection, Ticket};
use crate::error::{self, Result};
use crate::identity::IdentityProvider;
use crate::store::CollectionStore;

/// Synchronized wishlist for one session.
pub struct WishlistSync<S, P> {
    collection: SyncedCollection<WishlistItem, S, P>,
}

impl<S: CollectionStore, P: IdentityProvider> WishlistSync<S, P> {
    pub(crate) fn new(shared: Arc<Shared<S, P>>, serialize_mutations: bool) -> Self {
        Self {
            collection: SyncedCollection::new(shared, serialize_mutations),
        }
    }

    /// Replace the wishlist with the store's copy.
    ///
    /// # Errors
    ///
    /// Returns the store error; the previous wishlist is kept.
    pub async fn fetch(&self) -> Result<()> {
        self.collection.fetch().await
    }

    /// Save a product.
    ///
    /// # Errors
    ///
    /// Returns the store error; the wishlist is unchanged on error.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add(&self, product: ProductDetails) -> Result<()> {
        let _guard = self.collection.lock(&product.id).await;
        let ticket = self.collection.bind_for_mutation().await?;
        self.add_bound(&ticket, product).await
    }

    /// Add under an existing binding. The caller holds the product lock.
    async fn add_bound(&self, ticket: &Ticket, product: ProductDetails) -> Result<()> {
        let id = product.id.clone();
        if self.collection.holds(ticket, &id) {
            debug!("Already in wishlist");
            return Ok(());
        }

        let echoed = self
            .collection
            .store()
            .add::<WishlistItem>(&ticket.identity, &id, None)
            .await
            .map_err(|e| SyncedCollection::<WishlistItem, S, P>::failed(e, "add"))?;

        self.collection.reconcile(ticket, |mirror| {
            if mirror.contains(&id) {
                return;
            }
            let item = echoed
                .filter(|item| item.id() == &id)
                .unwrap_or_else(|| WishlistItem {
                    product,
                    added_at: Utc::now(),
                });
            mirror.upsert(item);
        });

        error::add_breadcrumb(
            CollectionKind::Wishlist.as_str(),
            "Added to wishlist",
            &[("product_id", id.as_str())],
        );
        Ok(())
    }

    /// Remove a product. Absent products are a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns the store error; the wishlist is unchanged on error.
    pub async fn remove(&self, id: &ProductId) -> Result<()> {
        self.collection.remove(id).await
    }

    /// Save the product if absent, remove it if present.
    ///
    /// Returns whether the product is saved afterwards.
    ///
    /// # Errors
    ///
    /// Returns the store error; the wishlist is unchanged on error.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn toggle(&self, product: ProductDetails) -> Result<bool> {
        let _guard = self.collection.lock(&product.id).await;
        let ticket = self.collection.bind_for_mutation().await?;
        if self.collection.holds(&ticket, &product.id) {
            self.collection.remove_bound(&ticket, &product.id).await?;
            Ok(false)
        } else {
            self.add_bound(&ticket, product).await?;
            Ok(true)
        }
    }

    /// Empty the wishlist.
    ///
    /// # Errors
    ///
    /// Returns the store error; the wishlist is unchanged on error.
    pub async fn clear(&self) -> Result<()> {
        self.collection.clear().await
    }

    /// Copy of the wishlist for rendering.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<WishlistItem> {
        self.collection.snapshot()
    }

    /// Number of saved products.
    #[must_use]
    pub fn count(&self) -> usize {
        self.collection.with_items(views::wishlist_count)
    }

    /// Whether `id` is saved.
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.collection.with_items(|items| views::contains(items, id))
    }

    /// Whether a fetch is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.collection.is_busy()
    }

    pub(crate) fn reset(&self, identity: Option<Identity>) {
        self.collection.reset(identity);
    }
}

impl Snapshot<WishlistItem> {
    /// Number of saved products.
    #[must_use]
    pub fn count(&self) -> usize {
        views::wishlist_count(&self.items)
    }
}
