//! Scripted shopping session against an in-memory Collection Store.
//!
//! Walks through guest adds, a login, a logout, and a failed call while the
//! store is unavailable, printing both collections after each step.

use basket_core::{BuyerId, PriceRange, ProductDetails, ProductId};
use basket_sync::{
    EngineOptions, GuestPolicy, IdentityResolver, InMemoryCollectionStore, MutationOutcome,
    SessionIdentity, SyncEngine, SyncError,
};
use rust_decimal::Decimal;
use tracing::info;

use super::output;

type DemoEngine = SyncEngine<InMemoryCollectionStore, SessionIdentity>;

fn catalog() -> Vec<ProductDetails> {
    vec![
        ProductDetails::new("tea-01")
            .with_name("Cast iron teapot")
            .with_price(Decimal::new(4500, 2)),
        ProductDetails::new("cup-02")
            .with_name("Stoneware cup")
            .with_price(Decimal::new(1200, 2)),
        ProductDetails::new("rug-03")
            .with_name("Wool rug")
            .with_price_range(PriceRange::new(Decimal::new(8900, 2), Decimal::new(14900, 2))),
    ]
}

fn show(step: &str, engine: &DemoEngine) {
    info!(step, "Demo step finished");
    output::print(&format!(
        "\n== {step}\n{}{}",
        output::cart(&engine.cart().snapshot()),
        output::wishlist(&engine.wishlist().snapshot()),
    ));
}

/// Run the scripted session.
///
/// # Errors
///
/// Returns an error if a step that should succeed fails.
pub async fn run() -> Result<(), SyncError> {
    let store = InMemoryCollectionStore::with_catalog(catalog());
    let session = SessionIdentity::anonymous();
    let engine = SyncEngine::new(
        store.clone(),
        IdentityResolver::new(session.clone(), GuestPolicy::PerSession),
        EngineOptions::default(),
    );
    engine.refresh().await?;

    engine
        .cart()
        .add(ProductDetails::new("tea-01"), 1)
        .await?;
    engine
        .cart()
        .add(ProductDetails::new("cup-02"), 2)
        .await?;
    engine
        .cart()
        .add(ProductDetails::new("cup-02"), 2)
        .await?;
    engine.wishlist().add(ProductDetails::new("rug-03")).await?;
    engine.wishlist().add(ProductDetails::new("rug-03")).await?;
    show("Guest adds (cup added twice, rug saved twice)", &engine);

    engine
        .cart()
        .update_quantity(&ProductId::new("cup-02"), 0)
        .await?;
    show("Cup quantity set to zero", &engine);

    session.login(BuyerId::new("demo-buyer"));
    engine
        .on_identity_change(Some(BuyerId::new("demo-buyer")))
        .await?;
    engine.cart().add(ProductDetails::new("rug-03"), 1).await?;
    show("Logged in as demo-buyer", &engine);

    store.set_available(false);
    let outcome = MutationOutcome::from(engine.cart().add(ProductDetails::new("tea-01"), 1).await);
    store.set_available(true);
    output::print(&format!(
        "\n== Store unavailable\n  success: {}, message: {}\n",
        outcome.success,
        outcome.message.as_deref().unwrap_or("-"),
    ));
    show("Mirror unchanged after the failed add", &engine);

    session.logout();
    engine.on_identity_change(None).await?;
    show("Logged out, guest collections restored", &engine);

    engine.cart().clear().await?;
    show("Guest cart cleared", &engine);

    engine.teardown();
    Ok(())
}
