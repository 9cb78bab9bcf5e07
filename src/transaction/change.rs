// ============================================================================
// Staged Changes
// ============================================================================
//
// Command Pattern records of what a flush cycle staged. Field mutations keep
// the instance handle and the old value, so a failed flush can put every
// field back the way it was.
//
// ============================================================================

use crate::core::{Result, Value};
use crate::entity::EntityRef;

/// A single change staged during a flush cycle
#[derive(Debug, Clone)]
pub enum Change {
    /// Field mutation registered with change tracking
    PropertyChanged {
        entity: EntityRef,
        entity_type: String,
        identifier: Value,
        field: String,
        old: Value,
        new: Value,
    },

    /// Field mutation written outside the regular change detection pass
    ExtraUpdate {
        entity: EntityRef,
        entity_type: String,
        identifier: Value,
        field: String,
        old: Value,
        new: Value,
    },

    /// Instance kept alive; any pending hard delete was cancelled
    Persisted { entity_type: String, identifier: Value },

    /// Instance removed from the store
    HardDeleted { entity_type: String, identifier: Value },
}

impl Change {
    pub fn entity_type(&self) -> &str {
        match self {
            Change::PropertyChanged { entity_type, .. } => entity_type,
            Change::ExtraUpdate { entity_type, .. } => entity_type,
            Change::Persisted { entity_type, .. } => entity_type,
            Change::HardDeleted { entity_type, .. } => entity_type,
        }
    }

    pub fn identifier(&self) -> &Value {
        match self {
            Change::PropertyChanged { identifier, .. } => identifier,
            Change::ExtraUpdate { identifier, .. } => identifier,
            Change::Persisted { identifier, .. } => identifier,
            Change::HardDeleted { identifier, .. } => identifier,
        }
    }

    /// Mutated field, for field-level changes
    pub fn field(&self) -> Option<&str> {
        match self {
            Change::PropertyChanged { field, .. } | Change::ExtraUpdate { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn is_property_change(&self) -> bool {
        matches!(self, Change::PropertyChanged { .. })
    }

    pub fn is_extra_update(&self) -> bool {
        matches!(self, Change::ExtraUpdate { .. })
    }

    /// Undo the in-memory effect of this change.
    ///
    /// Only property changes touch instance state; the other records are
    /// bookkeeping and revert to nothing.
    pub fn revert(&self) -> Result<()> {
        if let Change::PropertyChanged {
            entity, field, old, ..
        } = self
        {
            entity.replace_field_value(field, old.clone())?;
        }
        Ok(())
    }
}
