//! Cart synchronization.
//!
//! Adds accumulate, quantity updates replace in place, and setting a quantity
//! to zero removes the line. A successful add also opens the cart panel,
//! unless the identity changed while it was in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use basket_core::{CartItem, CollectionKind, Identity, Mirror, ProductDetails, ProductId, views};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::collection::{Shared, Snapshot, SyncedCollection};
use crate::error::{self, Result, SyncError};
use crate::identity::IdentityProvider;
use crate::store::CollectionStore;

/// Synchronized cart for one session.
pub struct CartSync<S, P> {
    collection: SyncedCollection<CartItem, S, P>,
    panel_open: AtomicBool,
}

impl<S: CollectionStore, P: IdentityProvider> CartSync<S, P> {
    pub(crate) fn new(shared: Arc<Shared<S, P>>, serialize_mutations: bool) -> Self {
        Self {
            collection: SyncedCollection::new(shared, serialize_mutations),
            panel_open: AtomicBool::new(false),
        }
    }

    /// Replace the cart with the store's copy.
    ///
    /// # Errors
    ///
    /// Returns the store error; the previous cart is kept.
    pub async fn fetch(&self) -> Result<()> {
        self.collection.fetch().await
    }

    /// Add `quantity` units of `product`.
    ///
    /// Units accumulate onto an existing line. When the store echoes the
    /// stored line it replaces the local one; otherwise the line is built
    /// from `product`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidQuantity`] for a zero quantity, or the
    /// store error. The cart is unchanged on error.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add(&self, product: ProductDetails, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return Err(SyncError::InvalidQuantity(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let id = product.id.clone();
        let _guard = self.collection.lock(&id).await;
        let ticket = self.collection.bind_for_mutation().await?;

        let echoed = self
            .collection
            .store()
            .add::<CartItem>(&ticket.identity, &id, Some(quantity))
            .await
            .map_err(|e| SyncedCollection::<CartItem, S, P>::failed(e, "add"))?;

        let applied = self.collection.reconcile(&ticket, |mirror| {
            apply_add(mirror, product, quantity, echoed);
        });
        if applied {
            self.panel_open.store(true, Ordering::Relaxed);
        }

        let quantity = quantity.to_string();
        error::add_breadcrumb(
            CollectionKind::Cart.as_str(),
            "Added to cart",
            &[("product_id", id.as_str()), ("quantity", &quantity)],
        );
        Ok(())
    }

    /// Set the quantity of a line. Zero removes the line.
    ///
    /// Updating a product not in the cart leaves the cart unchanged, whatever
    /// the store answers.
    ///
    /// # Errors
    ///
    /// Returns the store error; the cart is unchanged on error.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn update_quantity(&self, id: &ProductId, quantity: u32) -> Result<()> {
        if quantity == 0 {
            debug!("Quantity set to zero, removing line");
            return self.collection.remove(id).await;
        }

        let _guard = self.collection.lock(id).await;
        let ticket = self.collection.bind_for_mutation().await?;

        self.collection
            .store()
            .update(CollectionKind::Cart, &ticket.identity, id, quantity)
            .await
            .map_err(|e| SyncedCollection::<CartItem, S, P>::failed(e, "update"))?;

        self.collection.reconcile(&ticket, |mirror| {
            mirror.update(id, |line| line.quantity = quantity);
        });
        Ok(())
    }

    /// Remove a line. Absent products are a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns the store error; the cart is unchanged on error.
    pub async fn remove(&self, id: &ProductId) -> Result<()> {
        self.collection.remove(id).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns the store error; the cart is unchanged on error.
    pub async fn clear(&self) -> Result<()> {
        self.collection.clear().await
    }

    /// Copy of the cart for rendering.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<CartItem> {
        self.collection.snapshot()
    }

    /// Total units in the cart.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.collection.with_items(views::cart_count)
    }

    /// Cart total at effective unit prices.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.collection.with_items(views::cart_total)
    }

    /// Units of `id` in the cart, zero when absent.
    #[must_use]
    pub fn quantity_of(&self, id: &ProductId) -> u32 {
        self.collection.with_items(|items| views::quantity_of(items, id))
    }

    /// Whether `id` is in the cart.
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.collection.with_items(|items| views::contains(items, id))
    }

    /// Whether a fetch is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.collection.is_busy()
    }

    /// Whether the cart panel is shown.
    #[must_use]
    pub fn is_panel_open(&self) -> bool {
        self.panel_open.load(Ordering::Relaxed)
    }

    /// Show or hide the cart panel.
    pub fn set_panel_open(&self, open: bool) {
        self.panel_open.store(open, Ordering::Relaxed);
    }

    /// Flip the cart panel, returning the new state.
    pub fn toggle_panel(&self) -> bool {
        !self.panel_open.fetch_xor(true, Ordering::Relaxed)
    }

    pub(crate) fn reset(&self, identity: Option<Identity>) {
        self.collection.reset(identity);
        self.panel_open.store(false, Ordering::Relaxed);
    }
}

impl Snapshot<CartItem> {
    /// Total units.
    #[must_use]
    pub fn count(&self) -> u64 {
        views::cart_count(&self.items)
    }

    /// Total at effective unit prices.
    #[must_use]
    pub fn total(&self) -> Decimal {
        views::cart_total(&self.items)
    }

    /// Units of `id`, zero when absent.
    #[must_use]
    pub fn quantity_of(&self, id: &ProductId) -> u32 {
        views::quantity_of(&self.items, id)
    }
}

/// Reconcile a successful add into the mirror.
fn apply_add(
    mirror: &mut Mirror<CartItem>,
    product: ProductDetails,
    quantity: u32,
    echoed: Option<CartItem>,
) {
    if let Some(line) = echoed.filter(|line| line.product.id == product.id) {
        mirror.upsert(line);
        return;
    }
    let merged = mirror.update(&product.id, |line| {
        line.quantity = line.quantity.saturating_add(quantity);
    });
    if !merged {
        mirror.upsert(CartItem {
            product,
            quantity,
            added_at: Utc::now(),
        });
    }
}
