//! Collection commands against the configured Collection Store.
//!
//! Each command fetches the collection first so the printed result shows the
//! whole collection, not only the entries touched by the command.
//!
//! # Environment Variables
//!
//! - `BASKET_STORE_URL` - Collection Store base URL
//! - `BASKET_STORE_TOKEN` - Optional bearer token

use basket_core::{BuyerId, CollectionKind, ProductDetails, ProductId};
use basket_sync::{
    HttpCollectionStore, IdentityProvider, SessionIdentity, SyncConfig, SyncEngine, SyncError,
};
use thiserror::Error;

use super::output;

/// Errors that can occur during collection commands.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The store call failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Quantity given for a collection without quantities.
    #[error("{0} entries have no quantity")]
    NoQuantity(CollectionKind),
}

/// One collection command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Fetch(CollectionKind),
    Add(CollectionKind, ProductId, u32),
    Update(ProductId, u32),
    Remove(CollectionKind, ProductId),
    Clear(CollectionKind),
}

impl Action {
    const fn kind(&self) -> CollectionKind {
        match self {
            Self::Fetch(kind) | Self::Add(kind, ..) | Self::Remove(kind, _) | Self::Clear(kind) => {
                *kind
            }
            Self::Update(..) => CollectionKind::Cart,
        }
    }
}

/// Run `action` as `buyer`, or as the configured guest identity.
///
/// # Errors
///
/// Returns an error if the store cannot be reached or refuses the command.
pub async fn run(
    config: &SyncConfig,
    buyer: Option<BuyerId>,
    action: Action,
) -> Result<(), CollectionError> {
    let session = buyer.map_or_else(SessionIdentity::anonymous, SessionIdentity::logged_in);
    let engine = SyncEngine::from_config(config, session)?;

    let kind = action.kind();
    fetch(&engine, kind).await?;
    apply(&engine, action).await?;

    output::print(&match kind {
        CollectionKind::Cart => output::cart(&engine.cart().snapshot()),
        CollectionKind::Wishlist => output::wishlist(&engine.wishlist().snapshot()),
    });
    Ok(())
}

async fn fetch<P: IdentityProvider>(
    engine: &SyncEngine<HttpCollectionStore, P>,
    kind: CollectionKind,
) -> Result<(), SyncError> {
    match kind {
        CollectionKind::Cart => engine.cart().fetch().await,
        CollectionKind::Wishlist => engine.wishlist().fetch().await,
    }
}

async fn apply<P: IdentityProvider>(
    engine: &SyncEngine<HttpCollectionStore, P>,
    action: Action,
) -> Result<(), CollectionError> {
    match action {
        Action::Fetch(_) => {}
        Action::Add(CollectionKind::Cart, id, quantity) => {
            engine.cart().add(ProductDetails::new(id), quantity).await?;
        }
        Action::Add(CollectionKind::Wishlist, id, quantity) => {
            if quantity != 1 {
                return Err(CollectionError::NoQuantity(CollectionKind::Wishlist));
            }
            engine.wishlist().add(ProductDetails::new(id)).await?;
        }
        Action::Update(id, quantity) => engine.cart().update_quantity(&id, quantity).await?,
        Action::Remove(CollectionKind::Cart, id) => engine.cart().remove(&id).await?,
        Action::Remove(CollectionKind::Wishlist, id) => engine.wishlist().remove(&id).await?,
        Action::Clear(CollectionKind::Cart) => engine.cart().clear().await?,
        Action::Clear(CollectionKind::Wishlist) => engine.wishlist().clear().await?,
    }
    Ok(())
}
