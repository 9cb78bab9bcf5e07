// ============================================================================
// Unit of Work
// ============================================================================
//
// Changes staged by a store during one or more flush cycles. Applied changes
// stay in the log; a failed flush reverts back to the mark taken when it
// started.
//
// ============================================================================

pub mod change;

pub use change::Change;

use crate::core::{Result, Value};

/// Ordered log of staged changes
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Position to roll back to
    pub fn mark(&self) -> usize {
        self.changes.len()
    }

    /// Revert and discard every change recorded after `mark`, newest first.
    pub fn rollback_to(&mut self, mark: usize) -> Result<()> {
        while self.changes.len() > mark {
            if let Some(change) = self.changes.pop() {
                change.revert()?;
            }
        }
        Ok(())
    }

    pub fn property_changes(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(|c| c.is_property_change())
    }

    pub fn extra_updates(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(|c| c.is_extra_update())
    }

    /// All changes touching one instance, by type and identifier
    pub fn for_entity<'a>(&'a self, entity_type: &'a str, identifier: &'a Value) -> impl Iterator<Item = &'a Change> {
        self.changes
            .iter()
            .filter(move |c| c.entity_type() == entity_type && c.identifier() == identifier)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
