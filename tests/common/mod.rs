#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use softcascade::{
    AssociationMapping, Change, Entity, EntityMetadata, EntityRef, FixedClock, InMemoryStore,
    ListenerOptions, MetadataCatalog, RelationshipMap, SoftDeleteEvent, SoftDeleteListener,
    SoftDeleteObserver, SoftDeleteRegistry, Value,
};
use std::sync::{Arc, Mutex};

#[derive(Debug, Entity)]
pub struct Customer {
    #[entity(id)]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
pub struct Order {
    #[entity(id)]
    pub id: i64,
    pub customer: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
pub struct OrderLine {
    #[entity(id)]
    pub id: i64,
    pub order: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Entity)]
pub struct Invoice {
    #[entity(id)]
    pub id: i64,
    pub order: Option<i64>,
}

pub fn deleted_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
}

pub fn order(id: i64, customer: Option<i64>) -> Order {
    Order {
        id,
        customer,
        deleted_at: None,
    }
}

pub fn line(id: i64, order: i64) -> OrderLine {
    OrderLine {
        id,
        order: Some(order),
        deleted_at: None,
    }
}

pub fn invoice(id: i64, order: i64) -> Invoice {
    Invoice {
        id,
        order: Some(order),
    }
}

/// Order ← OrderLine (CASCADE), Order ← Invoice (SET NULL), Customer ← Order (SET NULL).
pub fn shop_metadata() -> Vec<EntityMetadata> {
    vec![
        EntityMetadata::new("Customer"),
        EntityMetadata::new("Order")
            .association(AssociationMapping::many_to_one("customer", "Customer").on_delete("SET NULL")),
        EntityMetadata::new("OrderLine")
            .association(AssociationMapping::many_to_one("order", "Order").on_delete("CASCADE")),
        EntityMetadata::new("Invoice")
            .association(AssociationMapping::many_to_one("order", "Order").on_delete("SET NULL")),
    ]
}

pub fn shop_registry() -> SoftDeleteRegistry {
    SoftDeleteRegistry::new()
        .with_entity::<Order>()
        .with_entity::<OrderLine>()
}

pub fn listener_for(metadata: Vec<EntityMetadata>, registry: SoftDeleteRegistry) -> SoftDeleteListener {
    let registry = registry.with_hierarchy(&metadata);
    let catalog = MetadataCatalog::from_entities(metadata).unwrap();
    let map = RelationshipMap::build(&catalog).unwrap();
    SoftDeleteListener::with_options(
        Arc::new(map),
        Arc::new(registry),
        ListenerOptions::new().clock(Arc::new(FixedClock(deleted_at()))),
    )
}

pub fn shop_listener() -> SoftDeleteListener {
    listener_for(shop_metadata(), shop_registry())
}

pub fn field(entity: &EntityRef, name: &str) -> Value {
    entity.field_value(name).unwrap()
}

pub fn is_soft_deleted(entity: &EntityRef) -> bool {
    field(entity, "deleted_at") == Value::Timestamp(deleted_at())
}

/// `(entity type, identifier, field)` of every property change, in staging order.
pub fn property_changes(store: &InMemoryStore) -> Vec<(String, Value, String)> {
    store
        .changes()
        .iter()
        .filter_map(|change| match change {
            Change::PropertyChanged {
                entity_type,
                identifier,
                field,
                ..
            } => Some((entity_type.clone(), identifier.clone(), field.clone())),
            _ => None,
        })
        .collect()
}

/// Records every notification as `"<event>:<type>#<id>"`.
#[derive(Default)]
pub struct Recorder {
    pub seen: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn entries(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl SoftDeleteObserver for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn notify(&self, event: SoftDeleteEvent, entity: &EntityRef) {
        let entry = format!(
            "{}:{}#{}",
            event,
            entity.entity_type().unwrap(),
            entity.identifier().unwrap()
        );
        self.seen.lock().unwrap().push(entry);
    }
}
