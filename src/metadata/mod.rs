// ============================================================================
// Relationship Metadata
// ============================================================================
//
// Materialized mapping metadata, as produced by whatever mapping layer the
// host uses. The cascade engine only reads it, once, to build the
// relationship map.
//
// ============================================================================

pub mod catalog;

pub use catalog::MetadataCatalog;

use crate::core::Result;
use serde::{Deserialize, Serialize};

/// Provides the full set of entity metadata known to the host.
pub trait MetadataSource {
    fn all_metadata(&self) -> Result<Vec<EntityMetadata>>;
}

/// Cardinality of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl AssociationKind {
    /// Single-valued on the declaring side.
    pub fn is_to_one(&self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }
}

/// Physical foreign-key column behind an owning-side association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinColumn {
    pub name: String,
    #[serde(default = "default_referenced_column")]
    pub referenced_column_name: String,
    /// Raw `ON DELETE` declaration of the constraint, if any.
    #[serde(default)]
    pub on_delete: Option<String>,
}

fn default_referenced_column() -> String {
    "id".to_string()
}

impl JoinColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            referenced_column_name: default_referenced_column(),
            on_delete: None,
        }
    }

    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        self.on_delete = Some(action.into());
        self
    }

    /// Point the column at `column` of the target instead of `id`.
    pub fn references(mut self, column: impl Into<String>) -> Self {
        self.referenced_column_name = column.into();
        self
    }
}

/// One association declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationMapping {
    /// Relation field name on the declaring entity.
    pub field: String,
    pub target_entity: String,
    /// Class that originally declared the mapping. `None` means the entity
    /// carrying this mapping declared it itself.
    #[serde(default)]
    pub source_entity: Option<String>,
    pub kind: AssociationKind,
    #[serde(default)]
    pub is_owning_side: bool,
    #[serde(default)]
    pub join_columns: Vec<JoinColumn>,
}

impl AssociationMapping {
    pub fn new(field: impl Into<String>, target_entity: impl Into<String>, kind: AssociationKind) -> Self {
        Self {
            field: field.into(),
            target_entity: target_entity.into(),
            source_entity: None,
            kind,
            is_owning_side: false,
            join_columns: Vec::new(),
        }
    }

    /// Owning-side many-to-one with a single join column `<field>_id`.
    pub fn many_to_one(field: impl Into<String>, target_entity: impl Into<String>) -> Self {
        let field = field.into();
        let column = JoinColumn::new(format!("{}_id", field));
        Self::new(field, target_entity, AssociationKind::ManyToOne)
            .owning()
            .join_column(column)
    }

    /// Owning-side one-to-one with a single join column `<field>_id`.
    pub fn one_to_one(field: impl Into<String>, target_entity: impl Into<String>) -> Self {
        let field = field.into();
        let column = JoinColumn::new(format!("{}_id", field));
        Self::new(field, target_entity, AssociationKind::OneToOne)
            .owning()
            .join_column(column)
    }

    pub fn owning(mut self) -> Self {
        self.is_owning_side = true;
        self
    }

    pub fn inverse(mut self) -> Self {
        self.is_owning_side = false;
        self
    }

    pub fn join_column(mut self, column: JoinColumn) -> Self {
        self.join_columns.push(column);
        self
    }

    pub fn inherited_from(mut self, source_entity: impl Into<String>) -> Self {
        self.source_entity = Some(source_entity.into());
        self
    }

    /// Set the `ON DELETE` declaration on the first join column.
    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        if let Some(first) = self.join_columns.first_mut() {
            first.on_delete = Some(action.into());
        }
        self
    }

    /// Name of the class that declared this mapping.
    pub fn declared_by<'a>(&'a self, owner: &'a str) -> &'a str {
        self.source_entity.as_deref().unwrap_or(owner)
    }
}

/// Mapping metadata of one entity class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    /// Non-instantiable base carrying mappings for its children.
    #[serde(default)]
    pub is_mapped_superclass: bool,
    /// All known subclasses (direct and indirect).
    #[serde(default)]
    pub sub_classes: Vec<String>,
    #[serde(default)]
    pub identifier: Vec<String>,
    #[serde(default)]
    pub associations: Vec<AssociationMapping>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_mapped_superclass: false,
            sub_classes: Vec::new(),
            identifier: vec!["id".to_string()],
            associations: Vec::new(),
        }
    }

    pub fn mapped_superclass(mut self) -> Self {
        self.is_mapped_superclass = true;
        self
    }

    pub fn sub_class(mut self, name: impl Into<String>) -> Self {
        self.sub_classes.push(name.into());
        self
    }

    pub fn identifier<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn association(mut self, mapping: AssociationMapping) -> Self {
        self.associations.push(mapping);
        self
    }

    pub fn get_association(&self, field: &str) -> Option<&AssociationMapping> {
        self.associations.iter().find(|a| a.field == field)
    }
}
