//! Identity binding.
//!
//! An [`IdentityProvider`] reports the logged-in buyer, if any, and notifies
//! subscribers on login/logout. The [`IdentityResolver`] turns that into the
//! [`Identity`] every Collection Store call is scoped by, substituting a guest
//! identity according to the configured [`GuestPolicy`].

use std::sync::Arc;

use basket_core::{BuyerId, GuestId, Identity};
use tokio::sync::watch;

use crate::error::{Result, SyncError};

/// Source of the current authenticated buyer.
pub trait IdentityProvider: Send + Sync + 'static {
    /// The logged-in buyer, or `None` before login / after logout.
    fn current(&self) -> Option<BuyerId>;

    /// Receiver that changes whenever the buyer logs in or out.
    fn subscribe(&self) -> watch::Receiver<Option<BuyerId>>;
}

/// In-process session holding the logged-in buyer.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionIdentity {
    sender: Arc<watch::Sender<Option<BuyerId>>>,
}

impl SessionIdentity {
    /// A session with nobody logged in.
    #[must_use]
    pub fn anonymous() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// A session already bound to `buyer`.
    #[must_use]
    pub fn logged_in(buyer: BuyerId) -> Self {
        let (sender, _) = watch::channel(Some(buyer));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Bind the session to `buyer`. Subscribers are notified only on change.
    pub fn login(&self, buyer: BuyerId) {
        self.sender.send_if_modified(|current| {
            if current.as_ref() == Some(&buyer) {
                return false;
            }
            *current = Some(buyer);
            true
        });
    }

    /// Drop the buyer binding. Subscribers are notified only on change.
    pub fn logout(&self) {
        self.sender.send_if_modified(|current| current.take().is_some());
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Option<BuyerId> {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<BuyerId>> {
        self.sender.subscribe()
    }
}

/// How an unauthenticated browser is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestPolicy {
    /// Every guest shares one placeholder identity.
    ///
    /// Guest carts collide across unrelated browsers under this policy. It is
    /// kept as the default for parity with existing deployments.
    Shared(GuestId),
    /// Each resolver instance (one per session) gets its own random guest ID.
    PerSession,
    /// Guests are refused with [`SyncError::NoIdentity`].
    Refuse,
}

impl Default for GuestPolicy {
    fn default() -> Self {
        Self::Shared(GuestId::new("guest"))
    }
}

/// Resolves the identity for each remote call.
#[derive(Clone)]
pub struct IdentityResolver<P> {
    provider: P,
    guest: Option<GuestId>,
}

impl<P: IdentityProvider> IdentityResolver<P> {
    /// Create a resolver. `PerSession` draws its guest ID here, once.
    pub fn new(provider: P, policy: GuestPolicy) -> Self {
        let guest = match policy {
            GuestPolicy::Shared(id) => Some(id),
            GuestPolicy::PerSession => Some(GuestId::random()),
            GuestPolicy::Refuse => None,
        };
        Self { provider, guest }
    }

    /// Resolve the identity to use right now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoIdentity`] when nobody is logged in and the
    /// guest policy refuses guests.
    ///
    /// Returns [`SyncError::IdentityConflict`] when the buyer ID equals the
    /// guest ID; both would be sent to the store as the same `identity`.
    pub fn resolve(&self) -> Result<Identity> {
        match self.provider.current() {
            Some(buyer) => self.buyer(buyer),
            None => self
                .guest
                .clone()
                .map(Identity::Guest)
                .ok_or(SyncError::NoIdentity),
        }
    }

    /// Identity the resolver would produce for a given login state.
    ///
    /// Used when reacting to a change notification, where the new state is
    /// already known. `None` when that state has no usable identity.
    pub(crate) fn resolve_for(&self, buyer: Option<BuyerId>) -> Option<Identity> {
        match buyer {
            Some(buyer) => self.buyer(buyer).ok(),
            None => self.guest.clone().map(Identity::Guest),
        }
    }

    fn buyer(&self, buyer: BuyerId) -> Result<Identity> {
        if self
            .guest
            .as_ref()
            .is_some_and(|guest| guest.as_str() == buyer.as_str())
        {
            return Err(SyncError::IdentityConflict(buyer.to_string()));
        }
        Ok(Identity::Buyer(buyer))
    }

    /// Subscribe to login/logout notifications.
    pub fn subscribe(&self) -> watch::Receiver<Option<BuyerId>> {
        self.provider.subscribe()
    }
}
