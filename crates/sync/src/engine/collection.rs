//! Mirror state and reconciliation shared by the cart and the wishlist.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use basket_core::{CollectionEntry, Identity, Mirror, ProductId, SyncPhase};
use tracing::{debug, instrument};

use super::queue::{MutationGuard, MutationLocks};
use crate::error::{self, Result, SyncError};
use crate::identity::{IdentityProvider, IdentityResolver};
use crate::store::CollectionStore;

/// Store and resolver shared by every collection of one engine.
pub(crate) struct Shared<S, P> {
    pub(crate) store: S,
    pub(crate) resolver: IdentityResolver<P>,
}

/// Point-in-time copy of a mirror for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// Identity the mirror is bound to, if any.
    pub identity: Option<Identity>,
    /// Entries in display order.
    pub items: Vec<T>,
    /// Whether a fetch is in flight.
    pub busy: bool,
    /// Lifecycle for the bound identity.
    pub phase: SyncPhase,
}

impl<T: CollectionEntry> Snapshot<T> {
    /// Whether a product is present.
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        basket_core::views::contains(&self.items, id)
    }
}

/// Binding a remote call was issued under.
///
/// Reconciliation is applied only if the mirror is still bound to the same
/// identity and has not been reset since.
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    pub(crate) identity: Identity,
    epoch: u64,
}

struct MirrorState<T> {
    identity: Option<Identity>,
    epoch: u64,
    mirror: Mirror<T>,
    phase: SyncPhase,
    fetches_in_flight: usize,
    /// Bound to a new identity whose entries have not been loaded yet.
    needs_fetch: bool,
}

/// One synchronized collection.
pub(crate) struct SyncedCollection<T, S, P> {
    shared: Arc<Shared<S, P>>,
    state: Mutex<MirrorState<T>>,
    locks: MutationLocks,
}

impl<T, S, P> SyncedCollection<T, S, P>
where
    T: CollectionEntry,
    S: CollectionStore,
    P: IdentityProvider,
{
    pub(crate) fn new(shared: Arc<Shared<S, P>>, serialize_mutations: bool) -> Self {
        Self {
            shared,
            state: Mutex::new(MirrorState {
                identity: None,
                epoch: 0,
                mirror: Mirror::new(),
                phase: SyncPhase::Uninitialized,
                fetches_in_flight: 0,
                needs_fetch: false,
            }),
            locks: MutationLocks::new(serialize_mutations),
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.shared.store
    }

    fn state(&self) -> MutexGuard<'_, MirrorState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the current identity and bind the mirror to it.
    ///
    /// Binding to a different identity than the mirror holds empties the
    /// mirror first; it must never show another identity's entries.
    pub(crate) fn bind_current(&self) -> Result<Ticket> {
        self.bind().map(|(ticket, _)| ticket)
    }

    /// Like [`Self::bind_current`], also reporting whether the mirror still
    /// has to load the entries of an identity it moved to.
    fn bind(&self) -> Result<(Ticket, bool)> {
        let identity = self.shared.resolver.resolve()?;
        let mut state = self.state();
        if state.identity.as_ref() != Some(&identity) {
            debug!(collection = %T::KIND, identity = %identity, "Rebinding mirror");
            let switched = state.identity.is_some();
            Self::rebind(&mut state, Some(identity.clone()));
            state.needs_fetch = switched;
        }
        let ticket = Ticket {
            identity,
            epoch: state.epoch,
        };
        Ok((ticket, state.needs_fetch))
    }

    /// Bind before a mutation.
    ///
    /// A mirror that moved to another identity is empty until fetched, so the
    /// store's copy is loaded before the mutation is reconciled into it.
    pub(crate) async fn bind_for_mutation(&self) -> Result<Ticket> {
        let (ticket, needs_fetch) = self.bind()?;
        if !needs_fetch {
            return Ok(ticket);
        }
        debug!(collection = %T::KIND, "Identity changed, fetching before mutation");
        self.fetch().await?;
        self.bind_current()
    }

    /// Whether `id` is mirrored under the binding `ticket` was issued for.
    pub(crate) fn holds(&self, ticket: &Ticket, id: &ProductId) -> bool {
        let state = self.state();
        Self::is_current(&state, ticket) && state.mirror.contains(id)
    }

    /// Empty the mirror and bind it to `identity` (or to nothing).
    pub(crate) fn reset(&self, identity: Option<Identity>) {
        let mut state = self.state();
        state.needs_fetch = identity.is_some();
        Self::rebind(&mut state, identity);
    }

    fn rebind(state: &mut MirrorState<T>, identity: Option<Identity>) {
        state.identity = identity;
        state.epoch += 1;
        state.mirror.clear();
        state.phase = SyncPhase::Uninitialized;
    }

    /// Serialize mutations on `id` when enabled.
    pub(crate) async fn lock(&self, id: &ProductId) -> Option<MutationGuard> {
        self.locks.acquire(id).await
    }

    /// Apply `edit` to the mirror if `ticket` is still current.
    ///
    /// Returns whether the edit was applied.
    pub(crate) fn reconcile(&self, ticket: &Ticket, edit: impl FnOnce(&mut Mirror<T>)) -> bool {
        let mut state = self.state();
        if !Self::is_current(&state, ticket) {
            debug!(
                collection = %T::KIND,
                identity = %ticket.identity,
                "Discarding response for a superseded binding"
            );
            return false;
        }
        edit(&mut state.mirror);
        true
    }

    fn is_current(state: &MirrorState<T>, ticket: &Ticket) -> bool {
        state.epoch == ticket.epoch && state.identity.as_ref() == Some(&ticket.identity)
    }

    /// Log a failed store call and hand the error back.
    pub(crate) fn failed(err: SyncError, operation: &str) -> SyncError {
        error::report(&err, operation);
        err
    }

    /// Replace the mirror with the store's copy.
    ///
    /// On failure the previous mirror is kept. A response arriving after the
    /// binding changed is discarded.
    #[instrument(skip(self), fields(collection = %T::KIND))]
    pub(crate) async fn fetch(&self) -> Result<()> {
        let ticket = self.bind_current()?;
        {
            let mut state = self.state();
            state.fetches_in_flight += 1;
            if state.phase == SyncPhase::Uninitialized {
                state.phase = SyncPhase::Fetching;
            }
        }

        let result = self.shared.store.fetch::<T>(&ticket.identity).await;

        let mut state = self.state();
        state.fetches_in_flight = state.fetches_in_flight.saturating_sub(1);
        let current = Self::is_current(&state, &ticket);

        match result {
            Ok(items) if current => {
                let dropped = state.mirror.replace(items);
                if dropped > 0 {
                    tracing::warn!(
                        collection = %T::KIND,
                        dropped,
                        "Dropped duplicate or zero-quantity entries from store response"
                    );
                }
                state.phase = SyncPhase::Ready;
                state.needs_fetch = false;
                debug!(count = state.mirror.len(), "Mirror refreshed");
                Ok(())
            }
            Ok(_) => {
                debug!(
                    identity = %ticket.identity,
                    "Discarding fetch for a superseded binding"
                );
                Ok(())
            }
            Err(err) => {
                if current && state.phase == SyncPhase::Fetching {
                    state.phase = SyncPhase::Uninitialized;
                }
                drop(state);
                Err(Self::failed(err, "fetch"))
            }
        }
    }

    /// Remove a product. Absent products are a successful no-op.
    #[instrument(skip(self), fields(collection = %T::KIND, product_id = %id))]
    pub(crate) async fn remove(&self, id: &ProductId) -> Result<()> {
        let _guard = self.lock(id).await;
        let ticket = self.bind_for_mutation().await?;
        self.remove_bound(&ticket, id).await
    }

    /// Remove under an existing binding. The caller holds the product lock.
    pub(crate) async fn remove_bound(&self, ticket: &Ticket, id: &ProductId) -> Result<()> {
        self.shared
            .store
            .remove(T::KIND, &ticket.identity, id)
            .await
            .map_err(|e| Self::failed(e, "remove"))?;

        self.reconcile(ticket, |mirror| {
            mirror.remove(id);
        });
        error::add_breadcrumb(T::KIND.as_str(), "Removed item", &[("product_id", id.as_str())]);
        Ok(())
    }

    /// Remove every entry.
    #[instrument(skip(self), fields(collection = %T::KIND))]
    pub(crate) async fn clear(&self) -> Result<()> {
        let ticket = self.bind_for_mutation().await?;

        self.shared
            .store
            .clear(T::KIND, &ticket.identity)
            .await
            .map_err(|e| Self::failed(e, "clear"))?;

        self.reconcile(&ticket, Mirror::clear);
        error::add_breadcrumb(T::KIND.as_str(), "Cleared collection", &[]);
        Ok(())
    }

    /// Copy of the current state.
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        let state = self.state();
        Snapshot {
            identity: state.identity.clone(),
            items: state.mirror.items().to_vec(),
            busy: state.fetches_in_flight > 0,
            phase: state.phase,
        }
    }

    /// Run `read` against the mirror without copying it.
    pub(crate) fn with_items<R>(&self, read: impl FnOnce(&[T]) -> R) -> R {
        read(self.state().mirror.items())
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.state().fetches_in_flight > 0
    }
}
