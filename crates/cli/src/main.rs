//! Basket CLI - Inspect and edit carts and wishlists in a Collection Store.
//!
//! # Usage
//!
//! ```bash
//! # Show the guest cart
//! basket fetch cart
//!
//! # Add two units of a product to a buyer's cart
//! basket --buyer b-42 add cart p1 --quantity 2
//!
//! # Set a cart line's quantity (0 removes it)
//! basket update p1 5
//!
//! # Remove a product from the wishlist
//! basket remove wishlist p2
//!
//! # Empty a collection
//! basket clear cart
//!
//! # Run a scripted session against an in-memory store
//! basket demo
//! ```
//!
//! # Commands
//!
//! - `fetch`, `add`, `update`, `remove`, `clear` - Act on the configured store
//!   (see `basket_sync::config` for the environment variables)
//! - `demo` - No configuration needed

#![cfg_attr(not(test), forbid(unsafe_code))]

use basket_core::{BuyerId, CollectionKind, ProductId};
use basket_sync::SyncConfig;
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::collection::Action;

#[derive(Parser)]
#[command(name = "basket")]
#[command(author, version, about = "Cart and wishlist Collection Store tools")]
struct Cli {
    /// Act as this authenticated buyer instead of the guest identity
    #[arg(long, global = true)]
    buyer: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a collection
    Fetch {
        /// `cart` or `wishlist`
        collection: CollectionKind,
    },
    /// Add a product to a collection
    Add {
        /// `cart` or `wishlist`
        collection: CollectionKind,

        /// Product ID
        id: String,

        /// Units to add (cart only)
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set the quantity of a cart line (0 removes it)
    Update {
        /// Product ID
        id: String,

        /// New quantity
        quantity: u32,
    },
    /// Remove a product from a collection
    Remove {
        /// `cart` or `wishlist`
        collection: CollectionKind,

        /// Product ID
        id: String,
    },
    /// Remove every product from a collection
    Clear {
        /// `cart` or `wishlist`
        collection: CollectionKind,
    },
    /// Run a scripted session against an in-memory store
    Demo,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Defaults to warnings only so command output stays readable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "basket=warn,basket_sync=warn".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let action = match cli.command {
        Commands::Demo => {
            commands::demo::run().await?;
            return Ok(());
        }
        Commands::Fetch { collection } => Action::Fetch(collection),
        Commands::Add {
            collection,
            id,
            quantity,
        } => Action::Add(collection, ProductId::new(id), quantity),
        Commands::Update { id, quantity } => Action::Update(ProductId::new(id), quantity),
        Commands::Remove { collection, id } => Action::Remove(collection, ProductId::new(id)),
        Commands::Clear { collection } => Action::Clear(collection),
    };

    let config = SyncConfig::from_env()?;
    let _sentry_guard = init_sentry(&config);

    commands::collection::run(&config, cli.buyer.map(BuyerId::new), action).await?;
    Ok(())
}
