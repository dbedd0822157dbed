//! Fixtures for engine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use basket_core::{CollectionEntry, CollectionKind, Identity, ProductDetails, ProductId};
use rust_decimal::Decimal;
use tokio::sync::Semaphore;

use super::{EngineOptions, SyncEngine};
use crate::error::Result;
use crate::identity::{GuestPolicy, IdentityResolver, SessionIdentity};
use crate::store::{CollectionStore, InMemoryCollectionStore};

pub(crate) fn catalog() -> InMemoryCollectionStore {
    InMemoryCollectionStore::with_catalog([
        ProductDetails::new("p1")
            .with_name("Teapot")
            .with_price(Decimal::new(500, 0)),
        ProductDetails::new("p2").with_name("Lamp"),
        ProductDetails::new("p3")
            .with_name("Rug")
            .with_price(Decimal::new(1250, 1)),
    ])
}

pub(crate) fn engine_over<S: CollectionStore>(
    store: S,
    session: &SessionIdentity,
    serialize_mutations: bool,
) -> SyncEngine<S, SessionIdentity> {
    SyncEngine::new(
        store,
        IdentityResolver::new(session.clone(), GuestPolicy::default()),
        EngineOptions {
            serialize_mutations,
        },
    )
}

/// Poll `check` until it holds, failing the test after one second.
pub(crate) async fn wait_until(mut check: impl FnMut() -> bool) {
    let polled = tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached in time");
}

/// In-memory store whose calls each wait for a permit before running.
#[derive(Clone)]
pub(crate) struct GatedStore {
    pub(crate) inner: InMemoryCollectionStore,
    gate: Arc<Semaphore>,
    arrived: Arc<AtomicUsize>,
}

impl GatedStore {
    pub(crate) fn new(inner: InMemoryCollectionStore) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(0)),
            arrived: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let `calls` waiting calls through, in arrival order.
    pub(crate) fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    /// Calls that reached the gate so far, released or not.
    pub(crate) fn arrived(&self) -> usize {
        self.arrived.load(Ordering::SeqCst)
    }

    async fn pass(&self) {
        self.arrived.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

impl CollectionStore for GatedStore {
    async fn fetch<T: CollectionEntry>(&self, identity: &Identity) -> Result<Vec<T>> {
        self.pass().await;
        self.inner.fetch(identity).await
    }

    async fn add<T: CollectionEntry>(
        &self,
        identity: &Identity,
        id: &ProductId,
        quantity: Option<u32>,
    ) -> Result<Option<T>> {
        self.pass().await;
        self.inner.add(identity, id, quantity).await
    }

    async fn update(
        &self,
        kind: CollectionKind,
        identity: &Identity,
        id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        self.pass().await;
        self.inner.update(kind, identity, id, quantity).await
    }

    async fn remove(&self, kind: CollectionKind, identity: &Identity, id: &ProductId) -> Result<()> {
        self.pass().await;
        self.inner.remove(kind, identity, id).await
    }

    async fn clear(&self, kind: CollectionKind, identity: &Identity) -> Result<()> {
        self.pass().await;
        self.inner.clear(kind, identity).await
    }
}
