use std::collections::HashMap;
use crate::entity::{EntityRef, InstanceId};

/// Instances already handled in the current flush cycle, by object identity.
///
/// Holds a handle to every visited instance, so no allocation can be freed
/// and its address handed to another instance before the cycle ends.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: HashMap<InstanceId, EntityRef>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the instance was already visited.
    pub fn insert(&mut self, entity: &EntityRef) -> bool {
        let id = entity.instance_id();
        if self.seen.contains_key(&id) {
            return false;
        }
        self.seen.insert(id, entity.clone());
        true
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.seen.contains_key(&entity.instance_id())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
