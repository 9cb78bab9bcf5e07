// ============================================================================
// Soft Delete Notifications
// ============================================================================
//
// Observers registered with an EventManager hear about every soft delete,
// once before the deletion marker is written and once after its cascade has
// run. The listener ignores anything an observer does or returns.
//
// ============================================================================

use std::fmt;
use std::sync::Arc;
use crate::entity::EntityRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftDeleteEvent {
    PreSoftDelete,
    PostSoftDelete,
}

impl SoftDeleteEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PreSoftDelete => "preSoftDelete",
            Self::PostSoftDelete => "postSoftDelete",
        }
    }
}

impl fmt::Display for SoftDeleteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Receives soft-delete notifications
pub trait SoftDeleteObserver: Send + Sync {
    /// Observer name for debugging
    fn name(&self) -> &'static str;

    /// Whether this observer wants `event`
    fn handles(&self, _event: SoftDeleteEvent) -> bool {
        true
    }

    fn notify(&self, event: SoftDeleteEvent, entity: &EntityRef);
}

/// Registry of observers, notified in registration order
#[derive(Clone, Default)]
pub struct EventManager {
    observers: Vec<Arc<dyn SoftDeleteObserver>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn SoftDeleteObserver>) {
        log::debug!("registered soft-delete observer: {}", observer.name());
        self.observers.push(observer);
    }

    pub fn dispatch(&self, event: SoftDeleteEvent, entity: &EntityRef) {
        self.observers
            .iter()
            .filter(|observer| observer.handles(event))
            .for_each(|observer| observer.notify(event, entity));
    }

    pub fn observer_names(&self) -> Vec<&'static str> {
        self.observers.iter().map(|o| o.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("observers", &self.observer_names())
            .finish()
    }
}
