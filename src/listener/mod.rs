// ============================================================================
// Soft Delete Listener
// ============================================================================
//
// Hooks into a store's flush cycle. Every pending hard delete of a
// soft-deletable type becomes a write of the deletion marker, and the delete
// cascades through the relationship map:
//
//   SET_NULL dependents  - foreign key cleared in place
//   DELETE dependents    - soft-deleted in turn (if soft-deletable)
//
// A visited set scoped to one flush cycle stops cycles and diamonds in the
// dependency graph from touching an instance twice.
//
// ============================================================================

pub mod clock;
pub mod visited;

pub use clock::{Clock, FixedClock, SystemClock};
pub use visited::VisitedSet;

use std::sync::Arc;
use serde::Serialize;
use tracing::{Level, event, info_span};
use crate::cascade::{CascadeResolver, RelationshipMap};
use crate::config::{ListenerOptions, SoftDeleteRegistry};
use crate::core::{Result, Value};
use crate::entity::EntityRef;
use crate::event::{EventManager, SoftDeleteEvent, SoftDeleteObserver};
use crate::metadata::MetadataSource;
use crate::store::EntityStore;

/// What [`FlushCycle::schedule_soft_delete`] did with an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftDeleteOutcome {
    /// Deletion marker written and cascade applied
    SoftDeleted,
    /// Marker already set; the hard delete goes ahead untouched
    AlreadyDeleted,
    /// Seen earlier in this flush cycle
    AlreadyVisited,
    /// Type has no deletion marker
    NotSoftDeletable,
}

/// Counters for one flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub soft_deleted: usize,
    /// Scheduled deletions of types that are not soft-deletable
    pub hard_deletes: usize,
    /// Instances whose marker was already set
    pub already_deleted: usize,
    pub nulled_references: usize,
    pub already_visited: usize,
}

/// Converts hard deletes into soft deletes during a store flush.
///
/// Holds no per-cycle state, so one listener can serve any number of flush
/// cycles and be shared between threads.
#[derive(Debug)]
pub struct SoftDeleteListener {
    resolver: CascadeResolver,
    registry: Arc<SoftDeleteRegistry>,
    events: EventManager,
    options: ListenerOptions,
}

impl SoftDeleteListener {
    pub fn new(map: Arc<RelationshipMap>, registry: Arc<SoftDeleteRegistry>) -> Self {
        Self::with_options(map, registry, ListenerOptions::default())
    }

    pub fn with_options(
        map: Arc<RelationshipMap>,
        registry: Arc<SoftDeleteRegistry>,
        options: ListenerOptions,
    ) -> Self {
        Self {
            resolver: CascadeResolver::new(map, Arc::clone(&registry)),
            registry,
            events: EventManager::new(),
            options,
        }
    }

    /// Build the relationship map from `source` and wrap it in a listener.
    /// Subclasses in `source` inherit the registry entries of their ancestors.
    pub fn from_metadata(source: &dyn MetadataSource, registry: SoftDeleteRegistry) -> Result<Self> {
        let metadata = source.all_metadata()?;
        let (map, _) = RelationshipMap::from_metadata(&metadata);
        let registry = registry.with_hierarchy(&metadata);
        Ok(Self::new(Arc::new(map), Arc::new(registry)))
    }

    pub fn options(mut self, options: ListenerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn subscribe(&mut self, observer: Arc<dyn SoftDeleteObserver>) {
        self.events.register(observer);
    }

    pub fn resolver(&self) -> &CascadeResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &SoftDeleteRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    /// Start a flush cycle with a fresh visited set.
    pub fn begin_flush<'a, S>(&'a self, store: &'a mut S) -> FlushCycle<'a, S>
    where
        S: EntityStore + ?Sized,
    {
        FlushCycle {
            listener: self,
            store,
            visited: VisitedSet::new(),
            summary: FlushSummary::default(),
        }
    }

    /// Entry point called by the store once per flush: soft-delete every
    /// scheduled deletion whose type is soft-deletable and leave the rest to
    /// the hard delete.
    pub fn on_flush<S>(&self, store: &mut S) -> Result<FlushSummary>
    where
        S: EntityStore + ?Sized,
    {
        let scheduled = store.scheduled_deletions();
        let span = info_span!("softcascade.flush", scheduled = scheduled.len());
        let _enter = span.enter();

        let mut cycle = self.begin_flush(store);
        for entity in &scheduled {
            let entity_type = entity.entity_type()?;
            if self.registry.is_soft_deletable(&entity_type) {
                cycle.schedule_soft_delete(entity)?;
            } else {
                cycle.summary.hard_deletes += 1;
                event!(Level::DEBUG, entity_type = %entity_type, "hard delete passed through");
            }
        }

        let summary = cycle.finish();
        event!(
            Level::INFO,
            soft_deleted = summary.soft_deleted,
            hard_deletes = summary.hard_deletes,
            nulled_references = summary.nulled_references,
            "flush cycle processed"
        );
        Ok(summary)
    }
}

/// One flush cycle: the store being flushed plus the visited set, which lives
/// exactly as long as the cycle.
pub struct FlushCycle<'a, S: ?Sized> {
    listener: &'a SoftDeleteListener,
    store: &'a mut S,
    visited: VisitedSet,
    summary: FlushSummary,
}

impl<'a, S> FlushCycle<'a, S>
where
    S: EntityStore + ?Sized,
{
    /// Soft-delete one instance and cascade to its dependents.
    pub fn schedule_soft_delete(&mut self, entity: &EntityRef) -> Result<SoftDeleteOutcome> {
        if !self.visited.insert(entity) {
            self.summary.already_visited += 1;
            event!(Level::DEBUG, instance = %entity.instance_id(), "already visited");
            return Ok(SoftDeleteOutcome::AlreadyVisited);
        }

        let listener = self.listener;
        let entity_type = entity.entity_type()?;
        let Some(marker) = listener.registry.deletion_marker_field(&entity_type) else {
            return Ok(SoftDeleteOutcome::NotSoftDeletable);
        };

        let identifier = entity.identifier()?;
        let span = info_span!(
            "softcascade.soft_delete",
            entity_type = %entity_type,
            identifier = %identifier
        );
        let _enter = span.enter();

        if !entity.field_value(marker)?.is_null() {
            self.summary.already_deleted += 1;
            event!(Level::DEBUG, "deletion marker already set, hard delete proceeds");
            return Ok(SoftDeleteOutcome::AlreadyDeleted);
        }

        listener.events.dispatch(SoftDeleteEvent::PreSoftDelete, entity);

        let deleted_at = Value::Timestamp(listener.options.clock.now());
        let old = entity.replace_field_value(marker, deleted_at.clone())?;
        let staged = self
            .store
            .persist(entity)
            .and_then(|()| self.stage_mutation(entity, marker, &old, &deleted_at));
        undo_unstaged(entity, marker, old, staged)?;
        self.summary.soft_deleted += 1;

        self.cascade(entity)?;

        listener.events.dispatch(SoftDeleteEvent::PostSoftDelete, entity);
        event!(Level::DEBUG, "soft deleted");
        Ok(SoftDeleteOutcome::SoftDeleted)
    }

    fn cascade(&mut self, entity: &EntityRef) -> Result<()> {
        let listener = self.listener;
        let resolver = &listener.resolver;

        let configuration = resolver.configuration_for(entity)?;
        if configuration.is_empty() {
            return Ok(());
        }

        let working = resolver.effective_configuration(&configuration);
        if working.is_empty() {
            return Ok(());
        }

        let dependents = resolver.dependents_of(&*self.store, entity, &working)?;

        // Every reference is cleared before any dependent is soft-deleted.
        for (_, field, dependent) in dependents.set_null_dependents() {
            self.null_out(dependent, field)?;
        }

        for (_, dependent) in dependents.cascade_dependents() {
            self.schedule_soft_delete(dependent)?;
        }

        Ok(())
    }

    fn null_out(&mut self, dependent: &EntityRef, field: &str) -> Result<()> {
        if dependent.field_value(field)?.is_null() {
            return Ok(());
        }

        let old = dependent.replace_field_value(field, Value::Null)?;
        let staged = self.stage_mutation(dependent, field, &old, &Value::Null);
        undo_unstaged(dependent, field, old, staged)?;
        self.summary.nulled_references += 1;
        event!(Level::DEBUG, instance = %dependent.instance_id(), field = %field, "reference set to null");
        Ok(())
    }

    fn stage_mutation(&mut self, entity: &EntityRef, field: &str, old: &Value, new: &Value) -> Result<()> {
        self.store.register_property_mutation(entity, field, old, new)?;
        if !self.store.includes_late_mutations() {
            self.store.schedule_extra_update(entity, field, old, new)?;
        }
        Ok(())
    }

    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    pub fn summary(&self) -> &FlushSummary {
        &self.summary
    }

    /// End the cycle; the visited set is dropped here.
    pub fn finish(self) -> FlushSummary {
        self.summary
    }
}

// A write the store never recorded cannot be rolled back by it; restore the
// previous value here before surfacing the error.
fn undo_unstaged(entity: &EntityRef, field: &str, old: Value, staged: Result<()>) -> Result<()> {
    if let Err(err) = staged {
        entity.replace_field_value(field, old)?;
        event!(Level::ERROR, error = %err, field = %field, "store rejected staged write");
        return Err(err);
    }
    Ok(())
}
