//! Cart and wishlist entries.
//!
//! Both entry types share a flattened [`ProductDetails`] payload so the wire
//! shape matches the Collection Store's `CollectionItem`:
//!
//! ```json
//! {
//!   "id": "p1",
//!   "name": "Widget",
//!   "images": ["https://cdn.example/p1.jpg"],
//!   "category": "tools",
//!   "price": "500",
//!   "quantity": 2,
//!   "addedAt": "2026-01-01T00:00:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::{PriceRange, effective_unit_price};
use super::status::CollectionKind;

/// Product fields a mirror entry retains.
///
/// Only `id` is required; everything else is display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    /// Product identifier, unique within a collection.
    pub id: ProductId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Image URLs in display order.
    #[serde(default)]
    pub images: Vec<String>,
    /// Top-level category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Subcategory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Fixed unit price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Bounded unit price, used when `price` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
    /// Minimum order quantity (informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moq: Option<u32>,
}

impl ProductDetails {
    /// A payload carrying only the product ID.
    #[must_use]
    pub fn new(id: impl Into<ProductId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            images: Vec::new(),
            category: None,
            subcategory: None,
            price: None,
            price_range: None,
            moq: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set a fixed unit price.
    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set a bounded unit price.
    #[must_use]
    pub const fn with_price_range(mut self, range: PriceRange) -> Self {
        self.price_range = Some(range);
        self
    }

    /// Unit price used for totals (`price`, else `priceRange.min`, else zero).
    #[must_use]
    pub fn unit_price(&self) -> Decimal {
        effective_unit_price(self.price, self.price_range.as_ref())
    }
}

/// Behavior shared by every entry a mirror can hold.
pub trait CollectionEntry:
    Clone + std::fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The collection this entry type belongs to.
    const KIND: CollectionKind;

    /// Product payload of the entry.
    fn product(&self) -> &ProductDetails;

    /// Quantity the entry contributes to counts. Wishlist entries count once.
    fn quantity(&self) -> u32;

    /// Build an entry for a freshly added product.
    ///
    /// `quantity` is ignored by collections without quantities.
    fn from_product(product: ProductDetails, quantity: u32, added_at: DateTime<Utc>) -> Self;

    /// Key of the entry within its collection.
    fn id(&self) -> &ProductId {
        &self.product().id
    }
}

/// A cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(flatten)]
    pub product: ProductDetails,
    /// Units in the cart, always at least 1.
    pub quantity: u32,
    /// When the line was first added.
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Line total: unit price times quantity, saturating at the bounds of
    /// [`Decimal`].
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product
            .unit_price()
            .saturating_mul(Decimal::from(self.quantity))
    }
}

impl CollectionEntry for CartItem {
    const KIND: CollectionKind = CollectionKind::Cart;

    fn product(&self) -> &ProductDetails {
        &self.product
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }

    fn from_product(product: ProductDetails, quantity: u32, added_at: DateTime<Utc>) -> Self {
        Self {
            product,
            quantity,
            added_at,
        }
    }
}

/// A saved-for-later product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    #[serde(flatten)]
    pub product: ProductDetails,
    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl CollectionEntry for WishlistItem {
    const KIND: CollectionKind = CollectionKind::Wishlist;

    fn product(&self) -> &ProductDetails {
        &self.product
    }

    fn quantity(&self) -> u32 {
        1
    }

    fn from_product(product: ProductDetails, _quantity: u32, added_at: DateTime<Utc>) -> Self {
        Self { product, added_at }
    }
}
