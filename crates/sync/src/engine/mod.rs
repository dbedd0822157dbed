//! Synchronization engine.
//!
//! # Architecture
//!
//! - [`SyncEngine`] owns one [`CartSync`] and one [`WishlistSync`] for a session
//! - Each collection keeps a local mirror bound to exactly one identity
//! - Every mutation calls the store first and reconciles the mirror only on
//!   success; a failed call leaves the mirror untouched
//! - Login/logout resets both mirrors and refetches them
//!
//! Responses that arrive after the mirror was rebound to another identity are
//! discarded.

mod cart;
mod collection;
mod queue;
#[cfg(test)]
mod testing;
mod wishlist;

pub use cart::CartSync;
pub use collection::Snapshot;
pub use wishlist::WishlistSync;

use std::sync::{Arc, Weak};

use basket_core::BuyerId;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use self::collection::Shared;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::identity::{IdentityProvider, IdentityResolver};
use crate::store::{CollectionStore, HttpCollectionStore};

/// Engine behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Serialize mutations on the same product so their effects apply in
    /// call order.
    pub serialize_mutations: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            serialize_mutations: true,
        }
    }
}

/// Cart and wishlist synchronization for one session.
///
/// Cheap to clone; clones share the same mirrors.
pub struct SyncEngine<S, P> {
    inner: Arc<EngineInner<S, P>>,
}

struct EngineInner<S, P> {
    shared: Arc<Shared<S, P>>,
    cart: CartSync<S, P>,
    wishlist: WishlistSync<S, P>,
}

impl<S, P> Clone for SyncEngine<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: IdentityProvider> SyncEngine<HttpCollectionStore, P> {
    /// Create an engine talking to the configured HTTP store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig, provider: P) -> Result<Self> {
        let store = HttpCollectionStore::new(&config.store)?;
        let resolver = IdentityResolver::new(provider, config.guest_policy.clone());
        Ok(Self::new(
            store,
            resolver,
            EngineOptions {
                serialize_mutations: config.serialize_mutations,
            },
        ))
    }
}

impl<S: CollectionStore, P: IdentityProvider> SyncEngine<S, P> {
    /// Create an engine with empty, unbound mirrors.
    pub fn new(store: S, resolver: IdentityResolver<P>, options: EngineOptions) -> Self {
        let shared = Arc::new(Shared { store, resolver });
        Self {
            inner: Arc::new(EngineInner {
                cart: CartSync::new(Arc::clone(&shared), options.serialize_mutations),
                wishlist: WishlistSync::new(Arc::clone(&shared), options.serialize_mutations),
                shared,
            }),
        }
    }

    /// The cart.
    #[must_use]
    pub fn cart(&self) -> &CartSync<S, P> {
        &self.inner.cart
    }

    /// The wishlist.
    #[must_use]
    pub fn wishlist(&self) -> &WishlistSync<S, P> {
        &self.inner.wishlist
    }

    /// Fetch both collections concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the other collection is still refreshed.
    pub async fn refresh(&self) -> Result<()> {
        let (cart, wishlist) = tokio::join!(self.cart().fetch(), self.wishlist().fetch());
        cart.and(wishlist)
    }

    /// Rebind both mirrors after a login or logout, then refetch.
    ///
    /// The mirrors are emptied before the fetch starts, so the previous
    /// identity's entries are never shown under the new one.
    ///
    /// # Errors
    ///
    /// Returns the refetch failure; the mirrors stay empty and bound.
    #[instrument(skip(self, buyer), fields(buyer = buyer.as_ref().map(BuyerId::as_str)))]
    pub async fn on_identity_change(&self, buyer: Option<BuyerId>) -> Result<()> {
        let identity = self.inner.shared.resolver.resolve_for(buyer);
        self.cart().reset(identity.clone());
        self.wishlist().reset(identity.clone());

        match identity {
            Some(identity) => {
                info!(identity = %identity, "Identity changed, refetching collections");
                self.refresh().await
            }
            None => {
                debug!("Identity cleared with guests refused");
                Ok(())
            }
        }
    }

    /// Watch the identity provider and rebind on every login/logout.
    ///
    /// The task holds no strong reference to the engine and exits once the
    /// engine or the provider is dropped.
    pub fn spawn_identity_watcher(&self) -> JoinHandle<()> {
        let mut changes = self.inner.shared.resolver.subscribe();
        let engine: Weak<EngineInner<S, P>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let buyer = changes.borrow_and_update().clone();
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                let engine = Self { inner };
                if let Err(e) = engine.on_identity_change(buyer).await {
                    warn!(error = %e, "Refetch after identity change failed");
                }
            }
            debug!("Identity watcher stopped");
        })
    }

    /// Fetch both collections and start watching for identity changes.
    ///
    /// The watcher is started even when the initial fetch fails.
    pub async fn start(&self) -> (JoinHandle<()>, Result<()>) {
        let watcher = self.spawn_identity_watcher();
        let fetched = self.refresh().await;
        (watcher, fetched)
    }

    /// Empty and unbind both mirrors when the session ends.
    pub fn teardown(&self) {
        self.cart().reset(None);
        self.wishlist().reset(None);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use basket_core::{
        CartItem, GuestId, Identity, ProductDetails, ProductId, SyncPhase, WishlistItem,
    };
    use rust_decimal::Decimal;

    use super::testing::{GatedStore, catalog, engine_over, wait_until};
    use super::*;
    use crate::error::{MutationOutcome, SyncError};
    use crate::identity::{GuestPolicy, SessionIdentity};
    use crate::store::InMemoryCollectionStore;

    fn p(id: &str) -> ProductId {
        ProductId::new(id)
    }

    fn setup() -> (
        SyncEngine<InMemoryCollectionStore, SessionIdentity>,
        InMemoryCollectionStore,
        SessionIdentity,
    ) {
        let store = catalog();
        let session = SessionIdentity::anonymous();
        let engine = engine_over(store.clone(), &session, true);
        (engine, store, session)
    }

    fn assert_cart_invariants(items: &[CartItem]) {
        let mut ids: Vec<_> = items.iter().map(|i| i.product.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), items.len(), "duplicate ids in cart");
        assert!(items.iter().all(|i| i.quantity >= 1), "zero quantity in cart");
    }

    // =========================================================================
    // Cart
    // =========================================================================

    #[tokio::test]
    async fn test_adds_accumulate_into_one_line() {
        let (engine, _, _) = setup();
        let cart = engine.cart();

        cart.add(ProductDetails::new("p1").with_price(Decimal::new(500, 0)), 1)
            .await
            .unwrap();
        assert_eq!(cart.count(), 1);
        assert_eq!(cart.total(), Decimal::new(500, 0));

        cart.add(ProductDetails::new("p1"), 2).await.unwrap();
        assert_eq!(cart.count(), 3);
        assert_eq!(cart.total(), Decimal::new(1500, 0));

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.quantity_of(&p("p1")), 3);
        assert_cart_invariants(&snapshot.items);
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let (engine, store, _) = setup();
        let cart = engine.cart();
        cart.add(ProductDetails::new("p1"), 1).await.unwrap();

        cart.update_quantity(&p("p1"), 0).await.unwrap();

        assert!(!cart.contains(&p("p1")));
        assert_eq!(cart.count(), 0);
        assert_eq!(cart.total(), Decimal::ZERO);
        assert!(store.entries::<CartItem>("guest").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_quantity() {
        let (engine, _, _) = setup();
        let cart = engine.cart();
        cart.add(ProductDetails::new("p1"), 4).await.unwrap();

        cart.update_quantity(&p("p1"), 2).await.unwrap();

        assert_eq!(cart.quantity_of(&p("p1")), 2);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let (engine, _, _) = setup();
        let cart = engine.cart();
        cart.add(ProductDetails::new("p1"), 1).await.unwrap();
        let before = cart.snapshot();

        cart.remove(&p("px")).await.unwrap();

        assert_eq!(cart.snapshot(), before);
    }

    #[tokio::test]
    async fn test_clear_empties_cart() {
        let (engine, store, _) = setup();
        let cart = engine.cart();
        for id in ["p1", "p2", "p3"] {
            cart.add(ProductDetails::new(id), 1).await.unwrap();
        }
        assert_eq!(cart.snapshot().items.len(), 3);

        cart.clear().await.unwrap();

        assert!(cart.snapshot().items.is_empty());
        assert_eq!(cart.count(), 0);
        assert!(store.entries::<CartItem>("guest").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_zero_quantity_without_remote_call() {
        let (engine, store, _) = setup();

        let err = engine
            .cart()
            .add(ProductDetails::new("p1"), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::InvalidQuantity(_)));
        assert_eq!(store.request_count(), 0);
    }

    #[tokio::test]
    async fn test_add_opens_panel_and_identity_change_closes_it() {
        let (engine, _, session) = setup();
        assert!(!engine.cart().is_panel_open());

        engine.cart().add(ProductDetails::new("p1"), 1).await.unwrap();
        assert!(engine.cart().is_panel_open());
        assert!(!engine.cart().toggle_panel());
        assert!(engine.cart().toggle_panel());

        session.login(BuyerId::new("b-1"));
        engine
            .on_identity_change(Some(BuyerId::new("b-1")))
            .await
            .unwrap();
        assert!(!engine.cart().is_panel_open());
    }

    #[tokio::test]
    async fn test_failed_add_leaves_panel_closed() {
        let (engine, _, _) = setup();
        let result = engine.cart().add(ProductDetails::new("missing"), 1).await;

        assert!(matches!(result, Err(SyncError::Rejected { status: 404, .. })));
        assert!(!engine.cart().is_panel_open());
        assert!(engine.cart().snapshot().items.is_empty());
    }

    // =========================================================================
    // Wishlist
    // =========================================================================

    #[tokio::test]
    async fn test_wishlist_duplicate_add_is_single_entry() {
        let (engine, store, _) = setup();
        let wishlist = engine.wishlist();

        wishlist.add(ProductDetails::new("p2")).await.unwrap();
        let calls = store.request_count();
        wishlist.add(ProductDetails::new("p2")).await.unwrap();

        assert_eq!(store.request_count(), calls);
        assert_eq!(wishlist.count(), 1);
        assert!(wishlist.contains(&p("p2")));
    }

    #[tokio::test]
    async fn test_wishlist_toggle() {
        let (engine, store, _) = setup();
        let wishlist = engine.wishlist();

        assert!(wishlist.toggle(ProductDetails::new("p3")).await.unwrap());
        assert!(wishlist.contains(&p("p3")));

        assert!(!wishlist.toggle(ProductDetails::new("p3")).await.unwrap());
        assert_eq!(wishlist.snapshot().count(), 0);
        assert!(store.entries::<WishlistItem>("guest").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wishlist_echo_carries_catalog_details() {
        let (engine, _, _) = setup();
        engine
            .wishlist()
            .add(ProductDetails::new("p1"))
            .await
            .unwrap();

        let snapshot = engine.wishlist().snapshot();
        let saved = snapshot.items.first().unwrap();
        assert_eq!(saved.product.name, "Teapot");
        assert_eq!(saved.product.price, Some(Decimal::new(500, 0)));
    }

    #[tokio::test]
    async fn test_cart_and_wishlist_are_independent() {
        let (engine, _, _) = setup();
        engine.cart().add(ProductDetails::new("p1"), 1).await.unwrap();
        engine.wishlist().add(ProductDetails::new("p2")).await.unwrap();

        engine.cart().clear().await.unwrap();

        assert_eq!(engine.cart().count(), 0);
        assert_eq!(engine.wishlist().count(), 1);
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    #[tokio::test]
    async fn test_fetch_replaces_mirror_and_is_idempotent() {
        let (engine, store, _) = setup();
        store.add_entry::<CartItem>("guest", &p("p1"), Some(2)).unwrap();
        store.add_entry::<CartItem>("guest", &p("p3"), Some(1)).unwrap();

        assert_eq!(engine.cart().snapshot().phase, SyncPhase::Uninitialized);
        engine.refresh().await.unwrap();
        let first = engine.cart().snapshot();
        engine.refresh().await.unwrap();
        let second = engine.cart().snapshot();

        assert_eq!(first, second);
        assert_eq!(first.phase, SyncPhase::Ready);
        assert!(!first.busy);
        assert_eq!(first.count(), 3);
        assert_eq!(
            first.identity,
            Some(Identity::Guest(GuestId::new("guest")))
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_mirror() {
        let (engine, store, _) = setup();
        engine.cart().add(ProductDetails::new("p1"), 1).await.unwrap();
        engine.refresh().await.unwrap();
        let before = engine.cart().snapshot();

        store.set_available(false);
        let err = engine.cart().fetch().await.unwrap_err();

        assert!(err.is_transport());
        assert_eq!(engine.cart().snapshot(), before);
        assert!(!engine.cart().is_busy());
    }

    #[tokio::test]
    async fn test_busy_only_while_fetching() {
        let store = GatedStore::new(catalog());
        let session = SessionIdentity::anonymous();
        let engine = engine_over(store.clone(), &session, true);

        let fetching = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.cart().fetch().await })
        };
        wait_until(|| store.arrived() == 1).await;
        assert!(engine.cart().is_busy());
        assert_eq!(engine.cart().snapshot().phase, SyncPhase::Fetching);

        store.release(1);
        fetching.await.unwrap().unwrap();
        assert!(!engine.cart().is_busy());
        assert_eq!(engine.cart().snapshot().phase, SyncPhase::Ready);
    }

    // =========================================================================
    // Failure isolation
    // =========================================================================

    #[tokio::test]
    async fn test_failed_mutations_leave_mirror_untouched() {
        let (engine, store, _) = setup();
        engine.cart().add(ProductDetails::new("p1"), 2).await.unwrap();
        engine.wishlist().add(ProductDetails::new("p2")).await.unwrap();
        let cart_before = engine.cart().snapshot();
        let wishlist_before = engine.wishlist().snapshot();

        store.set_available(false);
        assert!(engine.cart().add(ProductDetails::new("p3"), 1).await.is_err());
        assert!(engine.cart().update_quantity(&p("p1"), 5).await.is_err());
        assert!(engine.cart().update_quantity(&p("p1"), 0).await.is_err());
        assert!(engine.cart().remove(&p("p1")).await.is_err());
        assert!(engine.cart().clear().await.is_err());
        assert!(engine.wishlist().add(ProductDetails::new("p3")).await.is_err());
        assert!(engine.wishlist().remove(&p("p2")).await.is_err());
        assert!(engine.wishlist().clear().await.is_err());

        assert_eq!(engine.cart().snapshot(), cart_before);
        assert_eq!(engine.wishlist().snapshot(), wishlist_before);
        assert_eq!(engine.cart().count(), 2);
        assert_eq!(engine.wishlist().count(), 1);
    }

    #[tokio::test]
    async fn test_failure_maps_to_outcome() {
        let (engine, store, _) = setup();
        store.set_available(false);

        let outcome = MutationOutcome::from(engine.cart().add(ProductDetails::new("p1"), 1).await);

        assert!(!outcome.success);
        assert!(outcome.message.is_some());
    }

    #[tokio::test]
    async fn test_refused_guest_never_reaches_store() {
        let store = catalog();
        let engine = SyncEngine::new(
            store.clone(),
            IdentityResolver::new(SessionIdentity::anonymous(), GuestPolicy::Refuse),
            EngineOptions::default(),
        );

        let err = engine
            .cart()
            .add(ProductDetails::new("p1"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NoIdentity));
        assert_eq!(store.request_count(), 0);
        assert!(engine.cart().snapshot().identity.is_none());
    }

    // =========================================================================
    // Identity
    // =========================================================================

    #[tokio::test]
    async fn test_identity_change_isolates_collections() {
        let (engine, _, session) = setup();
        engine.cart().add(ProductDetails::new("p1"), 1).await.unwrap();
        engine.wishlist().add(ProductDetails::new("p2")).await.unwrap();

        session.login(BuyerId::new("b-1"));
        engine
            .on_identity_change(Some(BuyerId::new("b-1")))
            .await
            .unwrap();

        assert!(engine.cart().snapshot().items.is_empty());
        assert!(engine.wishlist().snapshot().items.is_empty());
        assert_eq!(
            engine.cart().snapshot().identity,
            Some(Identity::Buyer(BuyerId::new("b-1")))
        );

        engine.cart().add(ProductDetails::new("p3"), 1).await.unwrap();

        session.logout();
        engine.on_identity_change(None).await.unwrap();
        assert!(engine.cart().contains(&p("p1")));
        assert!(!engine.cart().contains(&p("p3")));
        assert!(engine.wishlist().contains(&p("p2")));
    }

    #[tokio::test]
    async fn test_mutation_after_login_rebinds_before_calling_store() {
        let (engine, store, session) = setup();
        store.add_entry::<CartItem>("b-2", &p("p3"), Some(4)).unwrap();
        engine.refresh().await.unwrap();
        engine.cart().add(ProductDetails::new("p1"), 1).await.unwrap();

        // No notification processed yet: the next mutation still rebinds and
        // loads the buyer's cart before applying the add.
        session.login(BuyerId::new("b-2"));
        engine.cart().add(ProductDetails::new("p2"), 1).await.unwrap();

        let snapshot = engine.cart().snapshot();
        assert!(!snapshot.contains(&p("p1")));
        assert!(snapshot.contains(&p("p2")));
        assert_eq!(snapshot.quantity_of(&p("p3")), 4);
        assert_eq!(snapshot.count(), 5);
        assert_eq!(snapshot.phase, SyncPhase::Ready);
        assert_eq!(store.entries::<CartItem>("b-2").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_after_login_refetches_buyer_cart() {
        let (engine, store, session) = setup();
        store.add_entry::<CartItem>("b-2", &p("p1"), Some(2)).unwrap();
        store.add_entry::<CartItem>("b-2", &p("p3"), Some(1)).unwrap();
        engine.cart().add(ProductDetails::new("p2"), 1).await.unwrap();

        session.login(BuyerId::new("b-2"));
        engine.cart().remove(&p("p3")).await.unwrap();

        assert_eq!(engine.cart().quantity_of(&p("p1")), 2);
        assert!(!engine.cart().contains(&p("p2")));
        assert!(!engine.cart().contains(&p("p3")));
    }

    #[tokio::test]
    async fn test_failed_refetch_after_login_is_retried_by_next_mutation() {
        let (engine, store, session) = setup();
        store.add_entry::<CartItem>("b-2", &p("p3"), Some(4)).unwrap();
        engine.cart().add(ProductDetails::new("p1"), 1).await.unwrap();

        session.login(BuyerId::new("b-2"));
        store.set_available(false);
        assert!(engine.cart().add(ProductDetails::new("p2"), 1).await.is_err());
        assert!(engine.cart().snapshot().items.is_empty());

        store.set_available(true);
        engine.cart().add(ProductDetails::new("p2"), 1).await.unwrap();

        assert_eq!(engine.cart().count(), 5);
        assert_eq!(engine.cart().quantity_of(&p("p3")), 4);
        assert_eq!(store.entries::<CartItem>("b-2").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wishlist_add_after_login_reaches_buyer() {
        let (engine, store, session) = setup();
        engine.wishlist().add(ProductDetails::new("p2")).await.unwrap();

        // Saved as guest; the buyer's wishlist does not have it yet.
        session.login(BuyerId::new("b-1"));
        engine.wishlist().add(ProductDetails::new("p2")).await.unwrap();

        let snapshot = engine.wishlist().snapshot();
        assert_eq!(
            snapshot.identity,
            Some(Identity::Buyer(BuyerId::new("b-1")))
        );
        assert!(snapshot.contains(&p("p2")));
        assert_eq!(store.entries::<WishlistItem>("b-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wishlist_toggle_after_login_saves_for_buyer() {
        let (engine, store, session) = setup();
        engine.wishlist().add(ProductDetails::new("p2")).await.unwrap();

        session.login(BuyerId::new("b-1"));
        let saved = engine
            .wishlist()
            .toggle(ProductDetails::new("p2"))
            .await
            .unwrap();

        assert!(saved);
        assert!(engine.wishlist().contains(&p("p2")));
        assert_eq!(store.entries::<WishlistItem>("b-1").unwrap().len(), 1);
        assert_eq!(store.entries::<WishlistItem>("guest").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_buyer_colliding_with_guest_never_reaches_store() {
        let (engine, store, session) = setup();
        session.login(BuyerId::new("guest"));

        let err = engine
            .cart()
            .add(ProductDetails::new("p1"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::IdentityConflict(_)));
        assert_eq!(store.request_count(), 0);
        assert!(store.entries::<CartItem>("guest").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watcher_refetches_on_login_and_logout() {
        let (engine, store, session) = setup();
        store.add_entry::<CartItem>("b-1", &p("p3"), Some(4)).unwrap();
        let (watcher, fetched) = engine.start().await;
        fetched.unwrap();
        engine.cart().add(ProductDetails::new("p1"), 1).await.unwrap();

        session.login(BuyerId::new("b-1"));
        wait_until(|| {
            let snapshot = engine.cart().snapshot();
            snapshot.identity == Some(Identity::Buyer(BuyerId::new("b-1")))
                && snapshot.phase == SyncPhase::Ready
        })
        .await;
        assert_eq!(engine.cart().quantity_of(&p("p3")), 4);
        assert!(!engine.cart().contains(&p("p1")));

        session.logout();
        wait_until(|| engine.cart().contains(&p("p1"))).await;
        assert!(!engine.cart().contains(&p("p3")));

        watcher.abort();
    }

    #[tokio::test]
    async fn test_watcher_stops_when_engine_dropped() {
        let (engine, _, _) = setup();
        let watcher = engine.spawn_identity_watcher();

        drop(engine);

        let stopped = tokio::time::timeout(std::time::Duration::from_secs(1), watcher).await;
        assert!(stopped.is_ok());
    }

    #[tokio::test]
    async fn test_stale_fetch_is_discarded() {
        let store = GatedStore::new(catalog());
        store
            .inner
            .add_entry::<CartItem>("guest", &p("p1"), Some(1))
            .unwrap();
        let session = SessionIdentity::anonymous();
        let engine = engine_over(store.clone(), &session, true);

        let guest_fetch = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.cart().fetch().await })
        };
        wait_until(|| store.arrived() == 1).await;

        session.login(BuyerId::new("b-1"));
        let rebind = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .on_identity_change(Some(BuyerId::new("b-1")))
                    .await
            })
        };
        wait_until(|| store.arrived() == 3).await;

        store.release(3);
        guest_fetch.await.unwrap().unwrap();
        rebind.await.unwrap().unwrap();

        let snapshot = engine.cart().snapshot();
        assert_eq!(
            snapshot.identity,
            Some(Identity::Buyer(BuyerId::new("b-1")))
        );
        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.phase, SyncPhase::Ready);
        assert!(!snapshot.busy);
    }

    #[tokio::test]
    async fn test_superseded_add_leaves_panel_closed() {
        let store = GatedStore::new(catalog());
        let session = SessionIdentity::anonymous();
        let engine = engine_over(store.clone(), &session, true);

        let add = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.cart().add(ProductDetails::new("p1"), 1).await })
        };
        wait_until(|| store.arrived() == 1).await;

        session.login(BuyerId::new("b-1"));
        let rebind = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .on_identity_change(Some(BuyerId::new("b-1")))
                    .await
            })
        };
        wait_until(|| store.arrived() == 3).await;

        store.release(3);
        add.await.unwrap().unwrap();
        rebind.await.unwrap().unwrap();

        assert!(!engine.cart().is_panel_open());
        assert!(!engine.cart().contains(&p("p1")));
    }

    #[tokio::test]
    async fn test_teardown_unbinds_mirrors() {
        let (engine, _, _) = setup();
        engine.cart().add(ProductDetails::new("p1"), 1).await.unwrap();

        engine.teardown();

        let snapshot = engine.cart().snapshot();
        assert!(snapshot.identity.is_none());
        assert!(snapshot.items.is_empty());
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[tokio::test]
    async fn test_same_product_mutations_apply_in_call_order() {
        let store = GatedStore::new(catalog());
        let session = SessionIdentity::anonymous();
        let engine = engine_over(store.clone(), &session, true);

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.cart().add(ProductDetails::new("p1"), 1).await })
        };
        wait_until(|| store.arrived() == 1).await;
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.cart().update_quantity(&ProductId::new("p1"), 5).await })
        };
        let other = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.cart().add(ProductDetails::new("p2"), 1).await })
        };

        // The update waits on the product lock; the other product reaches the store.
        wait_until(|| store.arrived() == 2).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.arrived(), 2);

        store.release(3);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        other.await.unwrap().unwrap();

        let stored = store.inner.entries::<CartItem>("guest").unwrap();
        let mirrored = engine.cart().snapshot().items;
        for line in &stored {
            assert_eq!(
                engine.cart().quantity_of(&line.product.id),
                line.quantity
            );
        }
        assert_eq!(mirrored.len(), stored.len());
        assert_eq!(engine.cart().quantity_of(&p("p1")), 5);
        assert_cart_invariants(&mirrored);
    }

    #[tokio::test]
    async fn test_random_sequence_keeps_invariants() {
        let (engine, store, _) = setup();
        let cart = engine.cart();
        let ids = ["p1", "p2", "p3", "missing"];

        for (step, id) in (0_u32..60).zip(ids.iter().cycle().step_by(3)) {
            let _ = match step % 5 {
                0 | 1 => cart.add(ProductDetails::new(*id), step % 3 + 1).await,
                2 => cart.update_quantity(&p(id), step % 4).await,
                3 => cart.remove(&p(id)).await,
                _ => {
                    store.set_available(step % 10 != 4);
                    cart.add(ProductDetails::new(*id), 1).await
                }
            };
            store.set_available(true);

            let snapshot = cart.snapshot();
            assert_cart_invariants(&snapshot.items);
            assert_eq!(
                snapshot.count(),
                snapshot.items.iter().map(|i| u64::from(i.quantity)).sum::<u64>()
            );
        }

        let mirrored = cart.snapshot().items;
        cart.fetch().await.unwrap();
        let fetched = cart.snapshot().items;
        assert_eq!(mirrored.len(), fetched.len());
        for line in &fetched {
            assert_eq!(
                basket_core::views::quantity_of(&mirrored, &line.product.id),
                line.quantity
            );
        }
    }
}
