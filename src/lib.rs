// ============================================================================
// softcascade Library
// ============================================================================
//
// Soft-delete cascade resolution for entity stores: a hard delete of a
// soft-deletable entity becomes a timestamp write, and the delete propagates
// along foreign keys declared `ON DELETE CASCADE` / `ON DELETE SET NULL`.
//
// ============================================================================

extern crate self as softcascade;

pub mod core;
pub mod entity;
pub mod metadata;
pub mod config;
pub mod cascade;
pub mod store;
pub mod transaction;
pub mod event;
pub mod listener;

pub use crate::core::{CascadeError, FieldValue, Result, Value};
pub use entity::{Entity, EntityRef, InstanceId, SoftDeleteable};
pub use softcascade_derive::Entity;

pub use metadata::{
    AssociationKind, AssociationMapping, EntityMetadata, JoinColumn, MetadataCatalog, MetadataSource,
};
pub use config::{ListenerOptions, SoftDeleteConfig, SoftDeleteRegistry};
pub use cascade::{
    ActionFields, CascadeAction, CascadeConfiguration, CascadeResolver, DependentSet, MapBuildReport,
    RelationshipDescriptor, RelationshipMap, SkipReason,
};
pub use store::{EntityStore, FlushReport, ForeignKeyMatch, InMemoryStore};
pub use transaction::{Change, ChangeSet};
pub use event::{EventManager, SoftDeleteEvent, SoftDeleteObserver};
pub use listener::{
    Clock, FixedClock, FlushCycle, FlushSummary, SoftDeleteListener, SoftDeleteOutcome, SystemClock,
};
