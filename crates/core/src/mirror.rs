//! Ordered, id-keyed local copy of a remote collection.
//!
//! A [`Mirror`] never holds two entries with the same ID and never holds an
//! entry whose quantity is zero. Wholesale replacement normalizes incoming
//! data to keep both invariants; incremental edits preserve them.

use crate::types::{CollectionEntry, ProductId};

/// In-memory mirror of one collection for one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Mirror<T> {
    items: Vec<T>,
}

impl<T> Default for Mirror<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: CollectionEntry> Mirror<T> {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents wholesale.
    ///
    /// Entries with a zero quantity and repeated IDs (after the first
    /// occurrence) are dropped. Returns how many entries were dropped.
    pub fn replace(&mut self, items: Vec<T>) -> usize {
        let incoming = items.len();
        let mut kept: Vec<T> = Vec::with_capacity(incoming);
        for item in items {
            if item.quantity() == 0 || kept.iter().any(|k| k.id() == item.id()) {
                continue;
            }
            kept.push(item);
        }
        let dropped = incoming - kept.len();
        self.items = kept;
        dropped
    }

    /// Entries in display order.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Look up an entry by ID.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Whether an entry with this ID is present.
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.get(id).is_some()
    }

    /// Apply `edit` to the entry with this ID in place.
    ///
    /// Returns `false` when no such entry exists. An edit that leaves the
    /// entry at quantity zero removes it.
    pub fn update(&mut self, id: &ProductId, edit: impl FnOnce(&mut T)) -> bool {
        let Some(position) = self.position(id) else {
            return false;
        };
        if let Some(item) = self.items.get_mut(position) {
            edit(item);
            if item.quantity() == 0 {
                self.items.remove(position);
            }
        }
        true
    }

    /// Replace the entry with the same ID in place, or append it.
    ///
    /// Zero-quantity entries are treated as a removal.
    pub fn upsert(&mut self, item: T) {
        if item.quantity() == 0 {
            let id = item.id().clone();
            self.remove(&id);
            return;
        }
        match self.position(item.id()) {
            Some(position) => {
                if let Some(slot) = self.items.get_mut(position) {
                    *slot = item;
                }
            }
            None => self.items.push(item),
        }
    }

    /// Remove the entry with this ID, returning it if it was present.
    pub fn remove(&mut self, id: &ProductId) -> Option<T> {
        self.position(id).map(|position| self.items.remove(position))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the mirror is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, id: &ProductId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }
}
