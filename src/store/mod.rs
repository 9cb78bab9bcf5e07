// ============================================================================
// Entity Store Collaborator
// ============================================================================
//
// What the cascade engine needs from the persistence layer it runs inside:
// the batch of pending hard deletes, a batched dependent lookup, and a way to
// stage field mutations into the current unit of work. The engine never
// commits; the store flushes whatever was staged.
//
// ============================================================================

pub mod memory;

pub use memory::{FlushReport, InMemoryStore};

use std::collections::BTreeMap;
use crate::core::{Result, Value};
use crate::entity::EntityRef;

/// One row returned by a dependent lookup, with the raw foreign-key value of
/// every relation field the query tested.
#[derive(Debug, Clone)]
pub struct ForeignKeyMatch {
    pub entity: EntityRef,
    pub raw_keys: BTreeMap<String, Value>,
}

impl ForeignKeyMatch {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            raw_keys: BTreeMap::new(),
        }
    }

    pub fn with_raw_key(mut self, field: impl Into<String>, value: Value) -> Self {
        self.raw_keys.insert(field.into(), value);
        self
    }

    pub fn raw_key(&self, field: &str) -> Option<&Value> {
        self.raw_keys.get(field)
    }

    /// Whether `field` of this row points at `identifier`.
    pub fn matches(&self, field: &str, identifier: &Value) -> bool {
        self.raw_key(field) == Some(identifier)
    }
}

pub trait EntityStore {
    /// Instances already scheduled for a hard delete in this flush cycle.
    fn scheduled_deletions(&self) -> Vec<EntityRef>;

    /// Every instance of `dependent_type` (subtypes included) for which at
    /// least one of `relation_fields` equals `match_value`, issued as a single
    /// disjunctive query.
    fn query_by_foreign_keys(
        &self,
        dependent_type: &str,
        relation_fields: &[String],
        match_value: &Value,
    ) -> Result<Vec<ForeignKeyMatch>>;

    /// Whether `query_by_foreign_keys` fills `raw_keys` for every tested
    /// field. Stores that cannot project raw keys get one query per field.
    fn supports_key_projection(&self) -> bool {
        true
    }

    /// Keep `entity` alive, cancelling any pending hard delete for it.
    fn persist(&mut self, entity: &EntityRef) -> Result<()>;

    /// Register a field mutation with the store's change tracking.
    fn register_property_mutation(
        &mut self,
        entity: &EntityRef,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> Result<()>;

    /// Stage a field write outside the regular change detection pass.
    fn schedule_extra_update(
        &mut self,
        entity: &EntityRef,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> Result<()>;

    /// Whether mutations made during the flush are picked up without an extra
    /// update.
    fn includes_late_mutations(&self) -> bool {
        false
    }
}
