use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use crate::core::{CascadeError, Result, serde_to_cascade_error};
use crate::entity::SoftDeleteable;
use crate::listener::{Clock, SystemClock};
use crate::metadata::EntityMetadata;

/// Soft-delete settings for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteConfig {
    /// Deletion marker field; a non-null value means "deleted".
    pub field_name: String,
}

impl SoftDeleteConfig {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
        }
    }
}

/// Per-type soft-delete configuration.
///
/// Types absent from the registry are not soft-deletable and keep their hard
/// delete semantics, unless [`with_hierarchy`](Self::with_hierarchy) names a
/// registered ancestor: a subclass inherits the configuration of its nearest
/// registered ancestor.
///
/// JSON form:
///
/// ```json
/// { "Order": { "field_name": "deleted_at" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoftDeleteRegistry {
    types: BTreeMap<String, SoftDeleteConfig>,
    /// Subclass → ancestors, nearest first.
    #[serde(skip)]
    ancestors: BTreeMap<String, Vec<String>>,
}

impl SoftDeleteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type by name
    pub fn with_type(mut self, entity_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        self.types
            .insert(entity_type.into(), SoftDeleteConfig::new(field_name));
        self
    }

    /// Register a type from its `#[entity(soft_delete = "...")]` declaration
    pub fn with_entity<E: SoftDeleteable>(self) -> Self {
        self.with_type(E::ENTITY_NAME, E::DELETION_MARKER_FIELD)
    }

    /// Record the class hierarchy of `metadata` so subclasses resolve to the
    /// configuration of their nearest registered ancestor.
    pub fn with_hierarchy(mut self, metadata: &[EntityMetadata]) -> Self {
        // `sub_classes` lists indirect subclasses too, so an ancestor's depth is
        // the number of classes that list it.
        let mut depth: BTreeMap<&str, usize> = BTreeMap::new();
        for parent in metadata {
            for child in &parent.sub_classes {
                *depth.entry(child.as_str()).or_default() += 1;
            }
        }

        for parent in metadata {
            for child in &parent.sub_classes {
                let ancestors = self.ancestors.entry(child.clone()).or_default();
                if !ancestors.contains(&parent.name) {
                    ancestors.push(parent.name.clone());
                }
            }
        }

        for ancestors in self.ancestors.values_mut() {
            ancestors.sort_by_key(|name| std::cmp::Reverse(depth.get(name.as_str()).copied().unwrap_or(0)));
        }
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let registry: Self = serde_json::from_str(json)
            .map_err(|e| serde_to_cascade_error("parse soft-delete configuration", e))?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| serde_to_cascade_error("serialize soft-delete configuration", e))
    }

    fn validate(&self) -> Result<()> {
        for (entity_type, config) in &self.types {
            if config.field_name.trim().is_empty() {
                return Err(CascadeError::ConfigError(format!(
                    "Entity '{}' declares an empty deletion marker field",
                    entity_type
                )));
            }
        }
        Ok(())
    }

    pub fn is_soft_deletable(&self, entity_type: &str) -> bool {
        self.get(entity_type).is_some()
    }

    pub fn deletion_marker_field(&self, entity_type: &str) -> Option<&str> {
        self.get(entity_type).map(|c| c.field_name.as_str())
    }

    /// Configuration of `entity_type`, or of its nearest registered ancestor.
    pub fn get(&self, entity_type: &str) -> Option<&SoftDeleteConfig> {
        self.types.get(entity_type).or_else(|| {
            self.ancestors
                .get(entity_type)?
                .iter()
                .find_map(|ancestor| self.types.get(ancestor))
        })
    }

    pub fn entity_types(&self) -> Vec<&str> {
        self.types.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Runtime options of a soft-delete listener.
#[derive(Clone)]
pub struct ListenerOptions {
    /// Source of deletion marker timestamps
    pub clock: Arc<dyn Clock>,
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerOptions").finish_non_exhaustive()
    }
}
