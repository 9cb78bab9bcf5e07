// ============================================================================
// Entity Capability
// ============================================================================
//
// The engine never knows concrete entity types at compile time. Every entity
// exposes the same narrow capability: its type name, its identifier, and
// read/write access to a named field. `#[derive(Entity)]` generates it.
//
// ============================================================================

use crate::core::{Result, Value};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Field access capability implemented by every managed entity type.
pub trait Entity: Send + Sync + fmt::Debug {
    /// Concrete entity type name, as used in relationship metadata.
    fn entity_type(&self) -> &str;

    /// Raw identifier components in key order.
    fn identifier_values(&self) -> Vec<Value>;

    /// Read a named field.
    fn field_value(&self, field: &str) -> Result<Value>;

    /// Overwrite a named field.
    fn set_field_value(&mut self, field: &str, value: Value) -> Result<()>;

    /// Identifier resolved for foreign-key comparison.
    fn identifier(&self) -> Value {
        Value::from_identifier(self.identifier_values())
    }
}

/// Static soft-delete declaration emitted by `#[entity(soft_delete = "...")]`.
pub trait SoftDeleteable {
    const ENTITY_NAME: &'static str;
    const DELETION_MARKER_FIELD: &'static str;
}

/// Object identity of a managed instance.
///
/// Two handles share an `InstanceId` only if they point at the same
/// allocation, regardless of primary key values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

impl InstanceId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst_{:x}", self.0)
    }
}

/// Shared handle to a managed entity instance.
///
/// Cloning the handle does not clone the entity; all clones observe the same
/// state and report the same [`InstanceId`].
#[derive(Clone)]
pub struct EntityRef {
    inner: Arc<RwLock<dyn Entity>>,
}

impl EntityRef {
    pub fn new<E: Entity + 'static>(entity: E) -> Self {
        Self {
            inner: Arc::new(RwLock::new(entity)),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        InstanceId(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        self.instance_id() == other.instance_id()
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, dyn Entity + 'static>> {
        Ok(self.inner.read()?)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, dyn Entity + 'static>> {
        Ok(self.inner.write()?)
    }

    pub fn entity_type(&self) -> Result<String> {
        Ok(self.read()?.entity_type().to_string())
    }

    pub fn identifier(&self) -> Result<Value> {
        Ok(self.read()?.identifier())
    }

    pub fn field_value(&self, field: &str) -> Result<Value> {
        self.read()?.field_value(field)
    }

    /// Overwrite a field and hand back the value it replaced.
    pub fn replace_field_value(&self, field: &str, value: Value) -> Result<Value> {
        let mut guard = self.write()?;
        let old = guard.field_value(field)?;
        guard.set_field_value(field, value)?;
        Ok(old)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Ok(entity) => write!(
                f,
                "EntityRef({}#{} @ {})",
                entity.entity_type(),
                entity.identifier(),
                self.instance_id()
            ),
            Err(_) => write!(f, "EntityRef(<locked> @ {})", self.instance_id()),
        }
    }
}
