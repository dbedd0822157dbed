//! Derived values over mirror contents.
//!
//! Pure functions with no I/O, recomputed from the entries on every call so
//! they can never drift from the mirror they summarize.

use rust_decimal::Decimal;

use crate::types::{CartItem, CollectionEntry, ProductId, WishlistItem};

/// Total units in the cart.
#[must_use]
pub fn cart_count(items: &[CartItem]) -> u64 {
    items.iter().map(|item| u64::from(item.quantity)).sum()
}

/// Number of wishlist entries.
#[must_use]
pub const fn wishlist_count(items: &[WishlistItem]) -> usize {
    items.len()
}

/// Cart total. Unpriced items contribute zero.
///
/// Saturates instead of overflowing on extreme prices.
#[must_use]
pub fn cart_total(items: &[CartItem]) -> Decimal {
    items
        .iter()
        .map(CartItem::line_total)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Whether an entry with this ID is present.
#[must_use]
pub fn contains<T: CollectionEntry>(items: &[T], id: &ProductId) -> bool {
    items.iter().any(|item| item.id() == id)
}

/// Quantity of a product in the cart, zero when absent.
#[must_use]
pub fn quantity_of(items: &[CartItem], id: &ProductId) -> u32 {
    items
        .iter()
        .find(|item| item.id() == id)
        .map_or(0, |item| item.quantity)
}
