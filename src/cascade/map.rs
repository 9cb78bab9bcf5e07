use serde::Serialize;
use std::collections::BTreeMap;
use crate::core::Result;
use crate::metadata::{EntityMetadata, MetadataSource};
use super::descriptor::{RelationshipDescriptor, SkippedRelationship, extract_descriptors};
use super::CascadeAction;

/// Relation fields of one dependent type, grouped by cascade action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActionFields {
    by_action: BTreeMap<CascadeAction, Vec<String>>,
}

impl ActionFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field under `action`; a field already listed is kept once.
    pub fn push(&mut self, action: CascadeAction, field: impl Into<String>) {
        let field = field.into();
        let fields = self.by_action.entry(action).or_default();
        if !fields.contains(&field) {
            fields.push(field);
        }
    }

    pub fn with(mut self, action: CascadeAction, field: impl Into<String>) -> Self {
        self.push(action, field);
        self
    }

    pub fn fields(&self, action: CascadeAction) -> &[String] {
        self.by_action.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (CascadeAction, &[String])> {
        self.by_action.iter().map(|(action, fields)| (*action, fields.as_slice()))
    }

    /// Every relation field regardless of action, in a stable order.
    pub fn all_fields(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for fields in self.by_action.values() {
            for field in fields {
                if !all.contains(field) {
                    all.push(field.clone());
                }
            }
        }
        all
    }

    pub fn without(&self, action: CascadeAction) -> Self {
        let mut by_action = self.by_action.clone();
        by_action.remove(&action);
        Self { by_action }
    }

    pub fn is_empty(&self) -> bool {
        self.by_action.values().all(Vec::is_empty)
    }
}

/// Cascade rules that apply when an instance of one referenced type is
/// deleted: dependent type → action → relation fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CascadeConfiguration {
    dependents: BTreeMap<String, ActionFields>,
}

impl CascadeConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependent(mut self, dependent_type: impl Into<String>, fields: ActionFields) -> Self {
        self.dependents.insert(dependent_type.into(), fields);
        self
    }

    fn push(&mut self, dependent_type: &str, action: CascadeAction, field: &str) {
        self.dependents
            .entry(dependent_type.to_string())
            .or_default()
            .push(action, field);
    }

    pub fn get(&self, dependent_type: &str) -> Option<&ActionFields> {
        self.dependents.get(dependent_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActionFields)> {
        self.dependents.iter().map(|(ty, fields)| (ty.as_str(), fields))
    }

    pub fn dependent_types(&self) -> Vec<&str> {
        self.dependents.keys().map(|s| s.as_str()).collect()
    }

    /// Keep only the entries for which `keep` returns a non-empty set.
    pub fn filter_map<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str, &ActionFields) -> ActionFields,
    {
        let dependents = self
            .dependents
            .iter()
            .filter_map(|(ty, fields)| {
                let kept = keep(ty, fields);
                (!kept.is_empty()).then(|| (ty.clone(), kept))
            })
            .collect();
        Self { dependents }
    }

    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.values().all(ActionFields::is_empty)
    }
}

/// Diagnostics collected while building a [`RelationshipMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MapBuildReport {
    pub descriptors: Vec<RelationshipDescriptor>,
    pub skipped: Vec<SkippedRelationship>,
    /// Descriptors whose join column points at a column outside the target's
    /// identifier. Dependents are matched on the identifier, so these rows
    /// are never found.
    pub non_identifier_references: Vec<RelationshipDescriptor>,
}

/// Referenced type → cascade configuration for deleting one of its instances.
///
/// Built once from the full metadata set and read-only afterwards. To pick up
/// new metadata, build a new map and swap it in whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RelationshipMap {
    by_referenced: BTreeMap<String, CascadeConfiguration>,
}

impl RelationshipMap {
    /// Build the map from every entity the source knows about.
    pub fn build(source: &dyn MetadataSource) -> Result<Self> {
        Ok(Self::build_with_report(source)?.0)
    }

    pub fn build_with_report(source: &dyn MetadataSource) -> Result<(Self, MapBuildReport)> {
        let metadata = source.all_metadata()?;
        Ok(Self::from_metadata(&metadata))
    }

    pub fn from_metadata(metadata: &[EntityMetadata]) -> (Self, MapBuildReport) {
        let (descriptors, skipped) = extract_descriptors(metadata);

        let by_name: BTreeMap<&str, &EntityMetadata> =
            metadata.iter().map(|m| (m.name.as_str(), m)).collect();

        let non_identifier_references: Vec<RelationshipDescriptor> = descriptors
            .iter()
            .filter(|d| {
                by_name
                    .get(d.target_type.as_str())
                    .is_some_and(|target| !target.identifier.contains(&d.referenced_column))
            })
            .cloned()
            .collect();
        for d in &non_identifier_references {
            log::warn!(
                "{}.{} references {}.{}, which is not part of its identifier",
                d.source_type,
                d.join_column,
                d.target_type,
                d.referenced_column
            );
        }

        let mut by_referenced: BTreeMap<String, CascadeConfiguration> = BTreeMap::new();
        for descriptor in &descriptors {
            let expanded = by_name
                .get(descriptor.target_type.as_str())
                .map(|m| m.sub_classes.as_slice())
                .unwrap_or(&[]);

            for referenced in std::iter::once(&descriptor.target_type).chain(expanded) {
                by_referenced.entry(referenced.clone()).or_default().push(
                    &descriptor.source_type,
                    descriptor.action,
                    &descriptor.relation_field,
                );
            }
        }

        log::debug!(
            "relationship map built: {} descriptors over {} referenced types, {} associations excluded",
            descriptors.len(),
            by_referenced.len(),
            skipped.len()
        );

        (
            Self { by_referenced },
            MapBuildReport {
                descriptors,
                skipped,
                non_identifier_references,
            },
        )
    }

    /// Cascade rules for deleting an instance of `referenced_type`; empty if
    /// nothing depends on it.
    pub fn configuration_for(&self, referenced_type: &str) -> CascadeConfiguration {
        self.by_referenced
            .get(referenced_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, referenced_type: &str) -> Option<&CascadeConfiguration> {
        self.by_referenced.get(referenced_type)
    }

    pub fn contains(&self, referenced_type: &str, dependent_type: &str) -> bool {
        self.by_referenced
            .get(referenced_type)
            .is_some_and(|config| config.get(dependent_type).is_some())
    }

    pub fn referenced_types(&self) -> Vec<&str> {
        self.by_referenced.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CascadeConfiguration)> {
        self.by_referenced.iter().map(|(ty, config)| (ty.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.by_referenced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_referenced.is_empty()
    }
}
