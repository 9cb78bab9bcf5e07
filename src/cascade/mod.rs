// ============================================================================
// Cascade Resolution
// ============================================================================
//
// Turns relationship metadata into a read-only map of cascade rules, and
// answers which instances depend on an instance being deleted.
//
// Naming: the *referenced* type is the one being deleted; the *dependent*
// type holds the foreign key pointing at it.
//
// ============================================================================

pub mod action;
pub mod dependents;
pub mod descriptor;
pub mod map;
pub mod resolver;

pub use action::CascadeAction;
pub use dependents::{DependentGroup, DependentSet};
pub use descriptor::{RelationshipDescriptor, SkipReason, SkippedRelationship, extract_descriptors};
pub use map::{ActionFields, CascadeConfiguration, MapBuildReport, RelationshipMap};
pub use resolver::CascadeResolver;
