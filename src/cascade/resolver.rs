use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{Level, event};
use crate::config::SoftDeleteRegistry;
use crate::core::{Result, Value};
use crate::entity::EntityRef;
use crate::metadata::MetadataSource;
use crate::store::EntityStore;
use super::dependents::{DependentGroup, DependentSet};
use super::map::{ActionFields, CascadeConfiguration, RelationshipMap};
use super::CascadeAction;

/// Answers "what depends on this instance" from the relationship map and the
/// store.
#[derive(Debug, Clone)]
pub struct CascadeResolver {
    map: Arc<RelationshipMap>,
    registry: Arc<SoftDeleteRegistry>,
}

impl CascadeResolver {
    pub fn new(map: Arc<RelationshipMap>, registry: Arc<SoftDeleteRegistry>) -> Self {
        Self { map, registry }
    }

    /// Build the map from `source` and wrap it, applying the class hierarchy
    /// of `source` to the registry.
    pub fn from_source(source: &dyn MetadataSource, registry: Arc<SoftDeleteRegistry>) -> Result<Self> {
        let metadata = source.all_metadata()?;
        let (map, _) = RelationshipMap::from_metadata(&metadata);
        let registry = Arc::unwrap_or_clone(registry).with_hierarchy(&metadata);
        Ok(Self::new(Arc::new(map), Arc::new(registry)))
    }

    pub fn map(&self) -> &RelationshipMap {
        &self.map
    }

    pub fn registry(&self) -> &SoftDeleteRegistry {
        &self.registry
    }

    /// Cascade rules for the instance's concrete type. No I/O.
    pub fn configuration_for(&self, instance: &EntityRef) -> Result<CascadeConfiguration> {
        let entity_type = instance.entity_type()?;
        Ok(self.configuration_for_type(&entity_type))
    }

    pub fn configuration_for_type(&self, entity_type: &str) -> CascadeConfiguration {
        self.map.configuration_for(entity_type)
    }

    /// Drop `DELETE` entries whose dependent type has no deletion marker;
    /// `SET_NULL` entries are always kept. Dependent types left with nothing
    /// disappear.
    pub fn effective_configuration(&self, configuration: &CascadeConfiguration) -> CascadeConfiguration {
        configuration.filter_map(|dependent_type, fields| {
            if self.registry.is_soft_deletable(dependent_type) {
                fields.clone()
            } else {
                fields.without(CascadeAction::Delete)
            }
        })
    }

    /// Query the store for every dependent named by `configuration`, one
    /// query per dependent type.
    pub fn dependents_of<S>(
        &self,
        store: &S,
        instance: &EntityRef,
        configuration: &CascadeConfiguration,
    ) -> Result<DependentSet>
    where
        S: EntityStore + ?Sized,
    {
        let identifier = instance.identifier()?;
        let mut dependents = DependentSet::new();

        for (dependent_type, actions) in configuration.iter() {
            if actions.is_empty() {
                continue;
            }

            let by_field = self
                .matches_by_field(store, dependent_type, actions, &identifier)
                .inspect_err(|err| {
                    event!(
                        Level::ERROR,
                        error = %err,
                        dependent_type = %dependent_type,
                        identifier = %identifier,
                        "dependent query failed"
                    );
                })?;

            let mut group = DependentGroup::default();
            let mut seen = BTreeSet::new();
            for (action, fields) in actions.iter() {
                for field in fields {
                    let Some(instances) = by_field.get(field) else {
                        continue;
                    };
                    for entity in instances {
                        match action {
                            CascadeAction::SetNull => group.push_set_null(field, entity.clone()),
                            CascadeAction::Delete => group.push_cascade(&mut seen, entity.clone()),
                        }
                    }
                }
            }

            event!(
                Level::DEBUG,
                dependent_type = %dependent_type,
                set_null = group.set_null.values().map(Vec::len).sum::<usize>(),
                cascade = group.cascade.len(),
                "dependents resolved"
            );
            dependents.insert(dependent_type, group);
        }

        Ok(dependents)
    }

    // Relation field → instances whose raw key for that field equals `identifier`.
    fn matches_by_field<S>(
        &self,
        store: &S,
        dependent_type: &str,
        actions: &ActionFields,
        identifier: &Value,
    ) -> Result<BTreeMap<String, Vec<EntityRef>>>
    where
        S: EntityStore + ?Sized,
    {
        let fields = actions.all_fields();
        let mut by_field: BTreeMap<String, Vec<EntityRef>> = BTreeMap::new();

        if store.supports_key_projection() {
            let matches = store.query_by_foreign_keys(dependent_type, &fields, identifier)?;
            for found in matches {
                // A row can satisfy the OR through one field only.
                for field in &fields {
                    if found.matches(field, identifier) {
                        by_field
                            .entry(field.clone())
                            .or_default()
                            .push(found.entity.clone());
                    }
                }
            }
        } else {
            for field in &fields {
                let matches =
                    store.query_by_foreign_keys(dependent_type, std::slice::from_ref(field), identifier)?;
                by_field
                    .entry(field.clone())
                    .or_default()
                    .extend(matches.into_iter().map(|m| m.entity));
            }
        }

        Ok(by_field)
    }
}
