//! Identity under which a buyer's collections are scoped.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::{BuyerId, GuestId};

/// The key the Collection Store scopes every collection by.
///
/// Two different identities never see each other's items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    /// A logged-in buyer.
    Buyer(BuyerId),
    /// An unauthenticated browser.
    Guest(GuestId),
}

impl Identity {
    /// The value sent to the Collection Store as `identity`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Buyer(id) => id.as_str(),
            Self::Guest(id) => id.as_str(),
        }
    }

    /// Whether this identity belongs to an authenticated buyer.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Buyer(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buyer(id) => write!(f, "buyer:{id}"),
            Self::Guest(id) => write!(f, "guest:{id}"),
        }
    }
}
