use std::collections::{BTreeMap, BTreeSet};
use crate::entity::{EntityRef, InstanceId};

/// Dependents of one dependent type, split by what must happen to them.
#[derive(Debug, Clone, Default)]
pub struct DependentGroup {
    /// Relation field → instances whose field must be cleared.
    pub set_null: BTreeMap<String, Vec<EntityRef>>,
    /// Instances to soft-delete, merged across relation fields.
    pub cascade: Vec<EntityRef>,
}

impl DependentGroup {
    pub fn set_null_for(&self, field: &str) -> &[EntityRef] {
        self.set_null.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn push_set_null(&mut self, field: &str, entity: EntityRef) {
        self.set_null.entry(field.to_string()).or_default().push(entity);
    }

    // Cascade targets are listed once even when several fields point back.
    pub(crate) fn push_cascade(&mut self, seen: &mut BTreeSet<InstanceId>, entity: EntityRef) {
        if seen.insert(entity.instance_id()) {
            self.cascade.push(entity);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cascade.is_empty() && self.set_null.values().all(Vec::is_empty)
    }
}

/// Everything that depends on one instance being deleted, keyed by dependent
/// type.
#[derive(Debug, Clone, Default)]
pub struct DependentSet {
    groups: BTreeMap<String, DependentGroup>,
}

impl DependentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, dependent_type: &str, group: DependentGroup) {
        self.groups.insert(dependent_type.to_string(), group);
    }

    pub fn get(&self, dependent_type: &str) -> Option<&DependentGroup> {
        self.groups.get(dependent_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DependentGroup)> {
        self.groups.iter().map(|(ty, group)| (ty.as_str(), group))
    }

    /// `(dependent type, relation field, instance)` for every reference to clear.
    pub fn set_null_dependents(&self) -> impl Iterator<Item = (&str, &str, &EntityRef)> {
        self.groups.iter().flat_map(|(ty, group)| {
            group.set_null.iter().flat_map(move |(field, instances)| {
                instances
                    .iter()
                    .map(move |entity| (ty.as_str(), field.as_str(), entity))
            })
        })
    }

    /// `(dependent type, instance)` for every dependent to soft-delete.
    pub fn cascade_dependents(&self) -> impl Iterator<Item = (&str, &EntityRef)> {
        self.groups.iter().flat_map(|(ty, group)| {
            group.cascade.iter().map(move |entity| (ty.as_str(), entity))
        })
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(DependentGroup::is_empty)
    }
}
