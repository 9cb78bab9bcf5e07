use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use crate::core::{CascadeError, Result, serde_to_cascade_error};
use super::{EntityMetadata, MetadataSource};

/// Catalog of entity metadata keyed by entity name.
///
/// Immutable once built: `with_entity` returns a new catalog and leaves the
/// old one untouched, so clones are cheap and can be shared freely.
#[derive(Debug, Clone)]
pub struct MetadataCatalog {
    entities: Arc<BTreeMap<String, EntityMetadata>>,
}

impl MetadataCatalog {
    pub fn new() -> Self {
        Self {
            entities: Arc::new(BTreeMap::new()),
        }
    }

    /// Add an entity - returns a NEW catalog.
    pub fn with_entity(self, metadata: EntityMetadata) -> Result<Self> {
        if self.entities.contains_key(&metadata.name) {
            return Err(CascadeError::MetadataError(format!(
                "Entity '{}' is already registered",
                metadata.name
            )));
        }

        let mut entities = (*self.entities).clone();
        entities.insert(metadata.name.clone(), metadata);

        Ok(Self {
            entities: Arc::new(entities),
        })
    }

    pub fn from_entities<I>(entities: I) -> Result<Self>
    where
        I: IntoIterator<Item = EntityMetadata>,
    {
        entities
            .into_iter()
            .try_fold(Self::new(), |catalog, metadata| catalog.with_entity(metadata))
    }

    /// Parse a JSON array of entity metadata.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entities: Vec<EntityMetadata> =
            serde_json::from_str(json).map_err(|e| serde_to_cascade_error("parse entity metadata", e))?;
        Self::from_entities(entities)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, name: &str) -> Result<&EntityMetadata> {
        self.entities
            .get(name)
            .ok_or_else(|| CascadeError::EntityTypeNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for MetadataCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSource for MetadataCatalog {
    fn all_metadata(&self) -> Result<Vec<EntityMetadata>> {
        Ok(self.entities.values().cloned().collect())
    }
}
