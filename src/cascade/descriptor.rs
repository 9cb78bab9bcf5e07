use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use crate::metadata::{AssociationMapping, EntityMetadata, JoinColumn};
use super::CascadeAction;

/// One cascade-bearing relationship: `source_type.relation_field` holds a
/// foreign key to `target_type` whose constraint declares `action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RelationshipDescriptor {
    pub source_type: String,
    pub target_type: String,
    pub relation_field: String,
    pub action: CascadeAction,
    /// First join column, the one carrying the constraint.
    pub join_column: String,
    /// Column of `target_type` the join column points at.
    pub referenced_column: String,
}

/// Why an association did not produce a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Declared on a mapped superclass, which is never instantiated.
    MappedSuperclass,
    /// Copy of a mapping declared by another class; counted there.
    Inherited { declared_by: String },
    NotToOne,
    NotOwningSide,
    MissingJoinColumn,
    NoOnDelete,
    UnrecognizedOnDelete(String),
    /// Second mapping for a relation field that already produced a descriptor.
    DuplicateRelationField,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MappedSuperclass => write!(f, "declared on a mapped superclass"),
            Self::Inherited { declared_by } => write!(f, "inherited from '{}'", declared_by),
            Self::NotToOne => write!(f, "not a to-one association"),
            Self::NotOwningSide => write!(f, "not the owning side"),
            Self::MissingJoinColumn => write!(f, "no join column"),
            Self::NoOnDelete => write!(f, "join column declares no on-delete action"),
            Self::UnrecognizedOnDelete(raw) => write!(f, "unrecognized on-delete action '{}'", raw),
            Self::DuplicateRelationField => write!(f, "duplicate relation field"),
        }
    }
}

/// An association excluded from the relationship map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRelationship {
    pub source_type: String,
    pub relation_field: String,
    pub reason: SkipReason,
}

// Classify one association declared on `owner`.
fn classify<'m>(
    owner: &EntityMetadata,
    mapping: &'m AssociationMapping,
) -> Result<(CascadeAction, &'m JoinColumn), SkipReason> {
    if owner.is_mapped_superclass {
        return Err(SkipReason::MappedSuperclass);
    }

    let declared_by = mapping.declared_by(&owner.name);
    if declared_by != owner.name {
        return Err(SkipReason::Inherited {
            declared_by: declared_by.to_string(),
        });
    }

    if !mapping.kind.is_to_one() {
        return Err(SkipReason::NotToOne);
    }

    if !mapping.is_owning_side {
        return Err(SkipReason::NotOwningSide);
    }

    // Only the first join column carries the constraint declaration.
    let Some(join_column) = mapping.join_columns.first() else {
        return Err(SkipReason::MissingJoinColumn);
    };

    let Some(raw) = join_column.on_delete.as_deref() else {
        return Err(SkipReason::NoOnDelete);
    };

    CascadeAction::from_on_delete(raw)
        .map(|action| (action, join_column))
        .ok_or_else(|| SkipReason::UnrecognizedOnDelete(raw.to_string()))
}

/// Extract cascade descriptors from the full metadata set.
///
/// Never fails: anything ambiguous is excluded and reported.
pub fn extract_descriptors(
    metadata: &[EntityMetadata],
) -> (Vec<RelationshipDescriptor>, Vec<SkippedRelationship>) {
    let mut descriptors = Vec::new();
    let mut skipped = Vec::new();
    let mut seen = BTreeSet::new();

    for owner in metadata {
        for mapping in &owner.associations {
            let outcome = classify(owner, mapping).and_then(|classified| {
                if seen.insert((owner.name.clone(), mapping.field.clone())) {
                    Ok(classified)
                } else {
                    Err(SkipReason::DuplicateRelationField)
                }
            });

            match outcome {
                Ok((action, join_column)) => descriptors.push(RelationshipDescriptor {
                    source_type: owner.name.clone(),
                    target_type: mapping.target_entity.clone(),
                    relation_field: mapping.field.clone(),
                    action,
                    join_column: join_column.name.clone(),
                    referenced_column: join_column.referenced_column_name.clone(),
                }),
                Err(reason) => {
                    log::debug!(
                        "relationship {}.{} excluded from cascade map: {}",
                        owner.name,
                        mapping.field,
                        reason
                    );
                    skipped.push(SkippedRelationship {
                        source_type: owner.name.clone(),
                        relation_field: mapping.field.clone(),
                        reason,
                    });
                }
            }
        }
    }

    (descriptors, skipped)
}
