//! Price representation using decimal arithmetic.
//!
//! A product carries either a fixed unit price or a bounded price range.
//! The fixed price is authoritative when both are present. When neither is
//! present the product is treated as priced at zero for totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bounded price for products sold at variable prices (e.g., tiered MOQs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    /// Lowest unit price.
    pub min: Decimal,
    /// Highest unit price.
    pub max: Decimal,
}

impl PriceRange {
    /// Create a new price range.
    #[must_use]
    pub const fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }
}

/// Resolve the unit price used for totals.
///
/// Fixed price first, then the lower bound of the range, then zero.
#[must_use]
pub fn effective_unit_price(price: Option<Decimal>, range: Option<&PriceRange>) -> Decimal {
    price
        .or_else(|| range.map(|r| r.min))
        .unwrap_or(Decimal::ZERO)
}
