use std::collections::{BTreeMap, BTreeSet, VecDeque};
use crate::core::{CascadeError, Result, Value};
use crate::entity::{Entity, EntityRef};
use crate::listener::{FlushSummary, SoftDeleteListener};
use crate::metadata::MetadataSource;
use crate::transaction::{Change, ChangeSet};
use super::{EntityStore, ForeignKeyMatch};

/// Outcome of [`InMemoryStore::flush`].
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    pub summary: FlushSummary,
    /// `(entity type, identifier)` of every instance actually removed.
    pub hard_deleted: Vec<(String, Value)>,
}

/// In-memory entity store with a unit of work.
///
/// `remove` only schedules a hard delete; `flush` runs the soft-delete
/// listener over the schedule and then removes whatever is still scheduled.
/// Every mutation the listener stages is recorded in [`ChangeSet`]. If the
/// listener fails, the flush is rolled back: field values, the deletion
/// schedule and the change log return to their state before the flush.
#[derive(Debug)]
pub struct InMemoryStore {
    entities: BTreeMap<String, Vec<EntityRef>>,
    subtypes: BTreeMap<String, BTreeSet<String>>,
    scheduled: Vec<EntityRef>,
    changes: ChangeSet,
    failing_types: BTreeSet<String>,
    key_projection: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            subtypes: BTreeMap::new(),
            scheduled: Vec::new(),
            changes: ChangeSet::new(),
            failing_types: BTreeSet::new(),
            key_projection: true,
        }
    }

    /// Store whose dependent lookups do not project raw keys.
    pub fn without_key_projection() -> Self {
        Self {
            key_projection: false,
            ..Self::new()
        }
    }

    pub fn insert<E: Entity + 'static>(&mut self, entity: E) -> Result<EntityRef> {
        let entity = EntityRef::new(entity);
        self.insert_ref(entity.clone())?;
        Ok(entity)
    }

    pub fn insert_ref(&mut self, entity: EntityRef) -> Result<()> {
        let entity_type = entity.entity_type()?;
        let instances = self.entities.entry(entity_type).or_default();
        if !instances.iter().any(|e| e.ptr_eq(&entity)) {
            instances.push(entity);
        }
        Ok(())
    }

    /// Make queries against `parent` also see instances of `child`.
    pub fn register_subtype(&mut self, parent: impl Into<String>, child: impl Into<String>) {
        self.subtypes.entry(parent.into()).or_default().insert(child.into());
    }

    /// Register every subclass declared in `source`, so polymorphic lookups
    /// follow the same hierarchy the relationship map was built from.
    pub fn register_hierarchy(&mut self, source: &dyn MetadataSource) -> Result<()> {
        for parent in source.all_metadata()? {
            for child in parent.sub_classes {
                self.register_subtype(parent.name.clone(), child);
            }
        }
        Ok(())
    }

    /// Schedule a hard delete for the next flush.
    pub fn remove(&mut self, entity: &EntityRef) -> Result<()> {
        if !self.contains(entity)? {
            return Err(CascadeError::StoreError(format!(
                "{} is not managed by this store",
                entity.instance_id()
            )));
        }
        if !self.is_scheduled_for_deletion(entity) {
            self.scheduled.push(entity.clone());
        }
        Ok(())
    }

    pub fn is_scheduled_for_deletion(&self, entity: &EntityRef) -> bool {
        self.scheduled.iter().any(|e| e.ptr_eq(entity))
    }

    pub fn contains(&self, entity: &EntityRef) -> Result<bool> {
        let entity_type = entity.entity_type()?;
        Ok(self
            .entities
            .get(&entity_type)
            .is_some_and(|instances| instances.iter().any(|e| e.ptr_eq(entity))))
    }

    pub fn find(&self, entity_type: &str, identifier: &Value) -> Result<Option<EntityRef>> {
        for entity in self.entities.get(entity_type).into_iter().flatten() {
            if entity.identifier()? == *identifier {
                return Ok(Some(entity.clone()));
            }
        }
        Ok(None)
    }

    /// Instances of exactly `entity_type`, in insertion order.
    pub fn all(&self, entity_type: &str) -> Vec<EntityRef> {
        self.entities.get(entity_type).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn take_changes(&mut self) -> ChangeSet {
        std::mem::take(&mut self.changes)
    }

    /// Make every dependent lookup against `entity_type` fail.
    pub fn fail_queries_on(&mut self, entity_type: impl Into<String>) {
        self.failing_types.insert(entity_type.into());
    }

    /// Run `listener` over the scheduled deletions, then apply the hard
    /// deletes that remain.
    pub fn flush(&mut self, listener: &SoftDeleteListener) -> Result<FlushReport> {
        let mark = self.changes.mark();
        let scheduled_before = self.scheduled.clone();

        let summary = match listener.on_flush(self) {
            Ok(summary) => summary,
            Err(err) => {
                self.changes.rollback_to(mark)?;
                self.scheduled = scheduled_before;
                return Err(err);
            }
        };

        let mut hard_deleted = Vec::new();
        for entity in std::mem::take(&mut self.scheduled) {
            let entity_type = entity.entity_type()?;
            let identifier = entity.identifier()?;
            if let Some(instances) = self.entities.get_mut(&entity_type) {
                instances.retain(|e| !e.ptr_eq(&entity));
            }
            log::debug!("hard deleted {} {}", entity_type, identifier);
            self.changes.record(Change::HardDeleted {
                entity_type: entity_type.clone(),
                identifier: identifier.clone(),
            });
            hard_deleted.push((entity_type, identifier));
        }

        Ok(FlushReport { summary, hard_deleted })
    }

    // `entity_type` plus every registered subtype, transitively.
    fn type_closure(&self, entity_type: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([entity_type.to_string()]);
        let mut ordered = Vec::new();
        while let Some(ty) = queue.pop_front() {
            if !seen.insert(ty.clone()) {
                continue;
            }
            if let Some(children) = self.subtypes.get(&ty) {
                queue.extend(children.iter().cloned());
            }
            ordered.push(ty);
        }
        ordered
    }

    fn describe(entity: &EntityRef) -> Result<(String, Value)> {
        Ok((entity.entity_type()?, entity.identifier()?))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for InMemoryStore {
    fn scheduled_deletions(&self) -> Vec<EntityRef> {
        self.scheduled.clone()
    }

    fn query_by_foreign_keys(
        &self,
        dependent_type: &str,
        relation_fields: &[String],
        match_value: &Value,
    ) -> Result<Vec<ForeignKeyMatch>> {
        if self.failing_types.contains(dependent_type) {
            return Err(CascadeError::QueryFailed(format!(
                "lookup of '{}' by {:?} failed",
                dependent_type, relation_fields
            )));
        }

        let mut matches = Vec::new();
        for ty in self.type_closure(dependent_type) {
            for entity in self.entities.get(&ty).into_iter().flatten() {
                let guard = entity.read()?;
                let mut found = ForeignKeyMatch::new(entity.clone());
                let mut hit = false;
                for field in relation_fields {
                    let raw = guard.field_value(field)?;
                    hit |= raw == *match_value;
                    if self.key_projection {
                        found.raw_keys.insert(field.clone(), raw);
                    }
                }
                if hit {
                    matches.push(found);
                }
            }
        }
        Ok(matches)
    }

    fn supports_key_projection(&self) -> bool {
        self.key_projection
    }

    fn persist(&mut self, entity: &EntityRef) -> Result<()> {
        self.scheduled.retain(|e| !e.ptr_eq(entity));
        self.insert_ref(entity.clone())?;
        self.changes.record(Change::Persisted {
            entity_type: entity.entity_type()?,
            identifier: entity.identifier()?,
        });
        Ok(())
    }

    fn register_property_mutation(
        &mut self,
        entity: &EntityRef,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> Result<()> {
        let (entity_type, identifier) = Self::describe(entity)?;
        self.changes.record(Change::PropertyChanged {
            entity: entity.clone(),
            entity_type,
            identifier,
            field: field.to_string(),
            old: old.clone(),
            new: new.clone(),
        });
        Ok(())
    }

    fn schedule_extra_update(
        &mut self,
        entity: &EntityRef,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> Result<()> {
        let (entity_type, identifier) = Self::describe(entity)?;
        self.changes.record(Change::ExtraUpdate {
            entity: entity.clone(),
            entity_type,
            identifier,
            field: field.to_string(),
            old: old.clone(),
            new: new.clone(),
        });
        Ok(())
    }
}
